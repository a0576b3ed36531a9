//! Downgrade detection.
//!
//! The monitor tracks the highest head this node has trusted and compares
//! both its own ledger and peer-claimed heads against it. It never mutates
//! the ledger; callers decide what to do with an alarm.

use ledgerlink_ledger::{Block, ChainHead, Ledger};
use std::collections::VecDeque;
use std::fmt;

const MAX_RETAINED_ALARMS: usize = 256;

/// A detected downgrade attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowngradeAlarm {
    /// The local ledger no longer holds the trusted head, or its head went
    /// backwards.
    LocalRollback {
        /// Head trusted before.
        trusted: ChainHead,
        /// Head the ledger reports now.
        observed: Option<ChainHead>,
    },
    /// A peer claimed a head below the trusted one.
    StaleHead {
        /// Claiming peer, if known.
        peer: Option<String>,
        /// Trusted head.
        trusted: ChainHead,
        /// Claimed head.
        claimed: ChainHead,
    },
    /// A peer claimed a different block at the trusted index.
    ConflictingHead {
        /// Claiming peer, if known.
        peer: Option<String>,
        /// Trusted head.
        trusted: ChainHead,
        /// Claimed head.
        claimed: ChainHead,
    },
    /// A peer claimed a head whose hash does not match its own fields.
    ForgedHead {
        /// Claiming peer, if known.
        peer: Option<String>,
        /// Claimed head.
        claimed: ChainHead,
    },
}

impl fmt::Display for DowngradeAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peer = |p: &Option<String>| p.clone().unwrap_or_else(|| "unknown".into());
        match self {
            DowngradeAlarm::LocalRollback { trusted, observed } => match observed {
                Some(head) => write!(
                    f,
                    "local head rolled back from #{} to #{}",
                    trusted.index, head.index
                ),
                None => write!(f, "local head #{} disappeared", trusted.index),
            },
            DowngradeAlarm::StaleHead {
                peer: p,
                trusted,
                claimed,
            } => write!(
                f,
                "peer {} claimed stale head #{} below trusted #{}",
                peer(p),
                claimed.index,
                trusted.index
            ),
            DowngradeAlarm::ConflictingHead { peer: p, claimed, .. } => write!(
                f,
                "peer {} claimed conflicting head at #{}",
                peer(p),
                claimed.index
            ),
            DowngradeAlarm::ForgedHead { peer: p, claimed } => write!(
                f,
                "peer {} claimed forged head at #{}",
                peer(p),
                claimed.index
            ),
        }
    }
}

/// Compares observed heads with the highest trusted one.
#[derive(Debug, Default)]
pub struct DowngradeMonitor {
    trusted: Option<ChainHead>,
    alarms: VecDeque<DowngradeAlarm>,
    total_alarms: u64,
}

impl DowngradeMonitor {
    /// Creates a monitor with nothing trusted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest head trusted so far.
    pub fn trusted(&self) -> Option<&ChainHead> {
        self.trusted.as_ref()
    }

    /// Periodic check against the local ledger.
    ///
    /// Raises [`DowngradeAlarm::LocalRollback`] if the head index went down
    /// or the trusted block at the head index is gone. Otherwise the current
    /// head becomes trusted.
    pub fn tick(&mut self, ledger: &Ledger) -> Option<DowngradeAlarm> {
        let observed = ledger.head();
        let Some(trusted) = self.trusted.clone() else {
            self.trusted = observed;
            return None;
        };

        let rolled_back = match &observed {
            None => true,
            Some(head) if head.index < trusted.index => true,
            Some(head) if head.index == trusted.index => {
                !ledger.contains(trusted.index, &trusted.hash)
            }
            Some(_) => false,
        };

        if rolled_back {
            return Some(self.raise(DowngradeAlarm::LocalRollback { trusted, observed }));
        }
        if let Some(head) = observed {
            if head.index > trusted.index {
                self.trusted = Some(head);
            }
        }
        None
    }

    /// Checks a block a peer presented as its current head.
    pub fn observe_peer_head(
        &mut self,
        peer: Option<&str>,
        claim: &Block,
    ) -> Option<DowngradeAlarm> {
        let claimed = ChainHead::from(claim);
        let peer = peer.map(str::to_string);

        if claim.verify_hash().is_err() {
            return Some(self.raise(DowngradeAlarm::ForgedHead { peer, claimed }));
        }

        let trusted = self.trusted.clone()?;
        if claimed.index < trusted.index {
            return Some(self.raise(DowngradeAlarm::StaleHead {
                peer,
                trusted,
                claimed,
            }));
        }
        if claimed.index == trusted.index && claimed.hash != trusted.hash {
            return Some(self.raise(DowngradeAlarm::ConflictingHead {
                peer,
                trusted,
                claimed,
            }));
        }
        None
    }

    fn raise(&mut self, alarm: DowngradeAlarm) -> DowngradeAlarm {
        if self.alarms.len() >= MAX_RETAINED_ALARMS {
            self.alarms.pop_front();
        }
        self.alarms.push_back(alarm.clone());
        self.total_alarms += 1;
        alarm
    }

    /// Most recent alarms, oldest first.
    pub fn alarms(&self) -> Vec<DowngradeAlarm> {
        self.alarms.iter().cloned().collect()
    }

    /// Alarms raised since creation or the last reset.
    pub fn total_alarms(&self) -> u64 {
        self.total_alarms
    }

    /// Forgets the trusted head and all alarms.
    pub fn reset(&mut self) {
        self.trusted = None;
        self.alarms.clear();
        self.total_alarms = 0;
    }
}
