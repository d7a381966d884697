#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Result as AnyResult};

use crate::domain::StartRequest;
use crate::session::SessionConfig;

pub fn validate_start(req: &StartRequest) -> AnyResult<SessionConfig> {
    let config = SessionConfig::from_minutes(req.duration_minutes)?;
    if let Some(ceiling) = req.ceiling_bytes {
        if usize::try_from(ceiling).is_err() {
            bail!("ceiling_bytes {ceiling} exceeds the address space");
        }
    }
    Ok(config)
}
