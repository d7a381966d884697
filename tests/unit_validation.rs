#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use memspeed_agent::domain::StartRequest;
use memspeed_agent::validation::validate_start;

#[test]
fn ok_fractional_minutes() {
    let r = StartRequest { duration_minutes: 0.25, ceiling_bytes: None };
    let cfg = validate_start(&r).expect("ok");
    assert!((cfg.requested_minutes() - 0.25).abs() < f64::EPSILON);
}

#[test]
fn ok_zero_ceiling() {
    let r = StartRequest { duration_minutes: 1.0, ceiling_bytes: Some(0) };
    assert!(validate_start(&r).is_ok());
}

#[test]
fn err_zero_duration() {
    let r = StartRequest { duration_minutes: 0.0, ceiling_bytes: None };
    assert!(validate_start(&r).is_err());
}

#[test]
fn err_negative_duration() {
    let r = StartRequest { duration_minutes: -3.0, ceiling_bytes: None };
    assert!(validate_start(&r).is_err());
}

#[test]
fn err_non_finite_duration() {
    let r1 = StartRequest { duration_minutes: f64::NAN, ceiling_bytes: None };
    assert!(validate_start(&r1).is_err());
    let r2 = StartRequest { duration_minutes: f64::INFINITY, ceiling_bytes: None };
    assert!(validate_start(&r2).is_err());
}
