//! Fallback-carrying results for memory operations
//!
//! Every public memory operation returns a [`Recall`]: either the value read
//! from the store, or the operation's documented default together with the
//! kind of fault that forced it. Callers on the conversational path simply
//! take the value; diagnostics can inspect the fault.

use crate::error::TwinError;
use tracing::{error, warn};

/// Why a memory operation fell back to its default value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Backend unreachable or returned an error
    Unavailable,
    /// Backend call exceeded its deadline
    Timeout,
    /// Stored record could not be decoded
    Corrupt,
}

impl FaultKind {
    pub fn of(error: &TwinError) -> Self {
        match error {
            TwinError::Timeout(_) => FaultKind::Timeout,
            TwinError::CorruptRecord(_) | TwinError::SerializationError(_) => FaultKind::Corrupt,
            _ => FaultKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recall<T> {
    Fresh(T),
    Degraded { value: T, fault: FaultKind },
}

impl<T> Recall<T> {
    /// Convert an internal result into a recall, logging the fault.
    pub fn from_result(operation: &str, result: crate::Result<T>, fallback: T) -> Self {
        match result {
            Ok(value) => Recall::Fresh(value),
            Err(err) => {
                let fault = FaultKind::of(&err);
                match fault {
                    FaultKind::Timeout => warn!("{} timed out, continuing without memory: {}", operation, err),
                    _ => error!("{} failed, continuing without memory: {}", operation, err),
                }
                Recall::Degraded { value: fallback, fault }
            }
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Recall::Fresh(value) => value,
            Recall::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Recall::Fresh(value) => value,
            Recall::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Recall::Degraded { .. })
    }

    pub fn fault(&self) -> Option<FaultKind> {
        match self {
            Recall::Fresh(_) => None,
            Recall::Degraded { fault, .. } => Some(*fault),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Recall<U> {
        match self {
            Recall::Fresh(value) => Recall::Fresh(f(value)),
            Recall::Degraded { value, fault } => Recall::Degraded { value: f(value), fault },
        }
    }

    /// Carry over a fault from an earlier step. An existing fault is kept.
    pub fn degrade(self, fault: Option<FaultKind>) -> Self {
        match (self, fault) {
            (Recall::Fresh(value), Some(fault)) => Recall::Degraded { value, fault },
            (recall, _) => recall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_result() {
        let recall = Recall::from_result("op", Ok(3usize), 0);
        assert!(!recall.is_degraded());
        assert_eq!(*recall.value(), 3);
        assert_eq!(recall.fault(), None);
    }

    #[test]
    fn test_timeout_is_distinguished() {
        let recall: Recall<usize> = Recall::from_result(
            "op",
            Err(TwinError::Timeout("get session".to_string())),
            0,
        );
        assert_eq!(recall.fault(), Some(FaultKind::Timeout));
        assert_eq!(recall.into_value(), 0);
    }

    #[test]
    fn test_store_error_maps_to_unavailable() {
        let recall: Recall<bool> = Recall::from_result(
            "op",
            Err(TwinError::StoreError("connection refused".to_string())),
            false,
        );
        assert_eq!(recall.fault(), Some(FaultKind::Unavailable));
        assert_eq!(recall.map(|b| !b).into_value(), true);
    }

    #[test]
    fn test_degrade_keeps_first_fault() {
        let fresh = Recall::Fresh(1).degrade(Some(FaultKind::Timeout));
        assert_eq!(fresh.fault(), Some(FaultKind::Timeout));

        let degraded = Recall::Degraded { value: 1, fault: FaultKind::Corrupt }
            .degrade(Some(FaultKind::Timeout));
        assert_eq!(degraded.fault(), Some(FaultKind::Corrupt));

        assert!(!Recall::Fresh(1).degrade(None).is_degraded());
    }
}
