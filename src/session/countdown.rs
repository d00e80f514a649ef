use chrono::{DateTime, Utc};

/// 一次倒计时步进的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// 仍在计时，附带剩余秒数
    Running(u64),
    /// 本次步进到达零点（只会出现一次）
    Expired,
    /// 已经到期过
    Finished,
}

/// 全局倒计时
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u64,
    fired: bool,
}

impl Countdown {
    pub fn new(remaining_secs: u64) -> Self {
        Self {
            remaining: remaining_secs,
            fired: false,
        }
    }

    /// 由服务端截止时间计算剩余秒数（向下取整，不小于 0）
    pub fn from_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let secs = (expires_at - now).num_seconds().max(0);
        Self::new(u64::try_from(secs).unwrap_or(0))
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.fired
    }

    /// 走一秒
    pub fn tick(&mut self) -> CountdownTick {
        if self.fired {
            return CountdownTick::Finished;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.fired = true;
            CountdownTick::Expired
        } else {
            CountdownTick::Running(self.remaining)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_from_expiry_floors_and_clamps() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(Countdown::from_expiry(now + Duration::milliseconds(2_900), now).remaining(), 2);
        assert_eq!(Countdown::from_expiry(now - Duration::seconds(30), now).remaining(), 0);
    }

    #[test]
    fn test_expires_exactly_once() {
        let mut countdown = Countdown::new(2);
        assert_eq!(countdown.tick(), CountdownTick::Running(1));
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.tick(), CountdownTick::Finished);
        assert_eq!(countdown.tick(), CountdownTick::Finished);
        assert!(countdown.is_expired());
    }

    #[test]
    fn test_already_expired_fires_on_first_tick() {
        let mut countdown = Countdown::new(0);
        assert_eq!(countdown.tick(), CountdownTick::Expired);
    }
}
