//! Staking pools (`*.pool.near`, `*.poolv1.near`). Pools report every
//! balance change in fixed-format logs rather than events.

use crate::decoder::event::{checked_amount, EventCause, EventDraft, EventKind};
use regex::Regex;
use std::sync::LazyLock;

static DEPOSIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(\S+) deposited (\d+)\. New unstaked balance is (\d+)").expect("valid regex")
});

static WITHDRAW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(\S+) withdrawing (\d+)\. New unstaked balance is (\d+)").expect("valid regex")
});

static STAKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@(\S+) staking (\d+)\. Received (\d+) new staking shares\. Total (\d+) unstaked balance and (\d+) staking shares",
    )
    .expect("valid regex")
});

static UNSTAKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@(\S+) unstaking (\d+)\. Spent (\d+) staking shares\. Total (\d+) unstaked balance and (\d+) staking shares",
    )
    .expect("valid regex")
});

static REWARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Epoch (\d+): Contract received total rewards of (\d+) tokens\. New total staked balance is (\d+)\. Total number of shares (\d+)",
    )
    .expect("valid regex")
});

const KIND: EventKind = EventKind::Staking;

fn balance(raw: &str) -> Option<i128> {
    raw.parse::<u128>().ok().and_then(|v| i128::try_from(v).ok())
}

fn decode_line(pool: &str, line: &str) -> Option<EventDraft> {
    if let Some(caps) = DEPOSIT.captures(line) {
        let amount = checked_amount(pool, &caps[2])?;
        return Some(
            EventDraft::new(KIND, EventCause::Deposit, &caps[1], amount)
                .involved(pool)
                .absolute(balance(&caps[3])),
        );
    }
    if let Some(caps) = WITHDRAW.captures(line) {
        let amount = checked_amount(pool, &caps[2])?;
        return Some(
            EventDraft::new(KIND, EventCause::Withdraw, &caps[1], -amount)
                .involved(pool)
                .absolute(balance(&caps[3])),
        );
    }
    if let Some(caps) = STAKE.captures(line) {
        let amount = checked_amount(pool, &caps[2])?;
        return Some(EventDraft::new(KIND, EventCause::Stake, &caps[1], amount).involved(pool));
    }
    if let Some(caps) = UNSTAKE.captures(line) {
        let amount = checked_amount(pool, &caps[2])?;
        return Some(EventDraft::new(KIND, EventCause::Unstake, &caps[1], -amount).involved(pool));
    }
    if let Some(caps) = REWARD.captures(line) {
        let amount = checked_amount(pool, &caps[2])?;
        return Some(
            EventDraft::new(KIND, EventCause::Reward, pool, amount)
                .absolute(balance(&caps[3]))
                .memo(Some(format!("epoch {}", &caps[1]))),
        );
    }
    None
}

pub fn decode(pool: &str, logs: &[String]) -> Vec<EventDraft> {
    logs.iter().filter_map(|line| decode_line(pool, line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_logs() {
        let logs: Vec<String> = [
            "@alice.near deposited 100. New unstaked balance is 150",
            "@alice.near staking 99. Received 90 new staking shares. Total 51 unstaked balance and 90 staking shares",
            "Contract total staked balance is 1000. Total number of shares 900",
            "@bob.near unstaking 10. Spent 9 staking shares. Total 10 unstaked balance and 0 staking shares",
            "@bob.near withdrawing 10. New unstaked balance is 0",
            "Epoch 1203: Contract received total rewards of 77 tokens. New total staked balance is 1077. Total number of shares 900",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let drafts = decode("astro.poolv1.near", &logs);
        let summary: Vec<_> = drafts
            .iter()
            .map(|d| (d.cause, d.affected.as_str(), d.delta, d.absolute))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventCause::Deposit, "alice.near", 100, Some(150)),
                (EventCause::Stake, "alice.near", 99, None),
                (EventCause::Unstake, "bob.near", -10, None),
                (EventCause::Withdraw, "bob.near", -10, Some(0)),
                (EventCause::Reward, "astro.poolv1.near", 77, Some(1077)),
            ]
        );
        assert!(drafts.iter().all(|d| d.kind == EventKind::Staking));
    }
}
