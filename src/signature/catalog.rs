//! Every signature the generator knows about.

use super::{HookCryWarning, HookGameWarning, Signature};
use crate::variant::Subsystem;

/// All signatures, in the order their patch functions are emitted.
pub fn all() -> Vec<Box<dyn Signature>> {
    vec![Box::new(HookGameWarning), Box::new(HookCryWarning)]
}

/// Signatures with a target in `subsystem`.
pub fn for_subsystem(subsystem: Subsystem) -> Vec<Box<dyn Signature>> {
    all()
        .into_iter()
        .filter(|s| s.subsystems().contains(&subsystem))
        .collect()
}

/// Subsystems with at least one signature, in generation order.
pub fn patched_subsystems() -> Vec<Subsystem> {
    Subsystem::ALL
        .into_iter()
        .filter(|&s| all().iter().any(|sig| sig.subsystems().contains(&s)))
        .collect()
}
