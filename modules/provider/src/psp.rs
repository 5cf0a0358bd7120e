use rand::Rng;
use uuid::Uuid;

/// The simulated authorization oracle's verdict. `AUTHORIZED` always carries a reference;
/// `DECLINED` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PspStatus {
    Authorized,
    Declined,
}

impl std::fmt::Display for PspStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PspStatus::Authorized => "AUTHORIZED",
            PspStatus::Declined => "DECLINED",
        };
        write!(f, "{s}")
    }
}

/// A stand-in for the external payment-service-provider. `decide` is a pure function of the
/// configured chance — no network call, no state carried between invocations.
pub struct PspSimulator {
    chance: f64,
    prefix: String,
}

impl PspSimulator {
    pub fn new(chance: f64, prefix: impl Into<String>) -> Self {
        Self { chance, prefix: prefix.into() }
    }

    pub fn decide(&self) -> (PspStatus, Option<String>) {
        if rand::thread_rng().gen::<f64>() < self.chance {
            let reference = format!("{}{}", self.prefix, Uuid::new_v4());
            (PspStatus::Authorized, Some(reference))
        } else {
            (PspStatus::Declined, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chance_zero_always_declines() {
        let psp = PspSimulator::new(0.0, "psp_");
        for _ in 0..50 {
            let (status, reference) = psp.decide();
            assert_eq!(status, PspStatus::Declined);
            assert!(reference.is_none());
        }
    }

    #[test]
    fn chance_one_always_authorizes_with_prefixed_reference() {
        let psp = PspSimulator::new(1.0, "psp_test_");
        for _ in 0..50 {
            let (status, reference) = psp.decide();
            assert_eq!(status, PspStatus::Authorized);
            let reference = reference.expect("authorized decision must carry a reference");
            assert!(reference.starts_with("psp_test_"));
        }
    }

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(PspStatus::Authorized.to_string(), "AUTHORIZED");
        assert_eq!(PspStatus::Declined.to_string(), "DECLINED");
    }
}
