use chrono::{DateTime, Utc};

/// An opaque code that authorises an agent to register itself with the
/// server (§3). `is_continuous` vouchers may be consumed repeatedly;
/// single-use vouchers record their first (and only) successful
/// consumption.
#[derive(Debug, Clone)]
pub struct ClaimVoucher {
    pub code: String,
    pub created_by: i64,
    pub is_continuous: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by_agent_id: Option<i64>,
}

impl ClaimVoucher {
    pub fn can_be_consumed(&self) -> bool {
        self.is_continuous || self.consumed_at.is_none()
    }

    /// Records a consumption. Single-use vouchers latch the first consumer;
    /// later calls on an already-consumed single-use voucher are rejected by
    /// the caller checking `can_be_consumed` first.
    pub fn consume(&mut self, agent_id: i64, now: DateTime<Utc>) {
        if !self.is_continuous {
            self.consumed_at = Some(now);
            self.consumed_by_agent_id = Some(agent_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_use_voucher_cannot_be_reused() {
        let mut voucher = ClaimVoucher {
            code: "abc".into(),
            created_by: 1,
            is_continuous: false,
            consumed_at: None,
            consumed_by_agent_id: None,
        };
        assert!(voucher.can_be_consumed());
        voucher.consume(42, Utc::now());
        assert!(!voucher.can_be_consumed());
    }

    #[test]
    fn continuous_voucher_is_always_consumable() {
        let voucher = ClaimVoucher {
            code: "abc".into(),
            created_by: 1,
            is_continuous: true,
            consumed_at: None,
            consumed_by_agent_id: None,
        };
        assert!(voucher.can_be_consumed());
    }
}
