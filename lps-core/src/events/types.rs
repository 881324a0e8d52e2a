//! Event types carried on the bus.

use crate::blockchain::BestBlock;
use crate::entities::{WatchedPeginQuote, WatchedPegoutQuote};
use lps_sdk::objects::{NodeType, PegoutDeposit};
use std::fmt;

/// Subscription key. One per [`Event`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    AcceptedPeginQuote,
    CallForUserCompleted,
    RegisterPeginCompleted,
    AcceptedPegoutQuote,
    PegoutDepositConfirmed,
    PegoutBtcSentToUser,
    PegoutRefunded,
    NodeEclipse,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventId::AcceptedPeginQuote => "AcceptedPeginQuote",
            EventId::CallForUserCompleted => "CallForUserCompleted",
            EventId::RegisterPeginCompleted => "RegisterPeginCompleted",
            EventId::AcceptedPegoutQuote => "AcceptedPegoutQuote",
            EventId::PegoutDepositConfirmed => "PegoutDepositConfirmed",
            EventId::PegoutBtcSentToUser => "PegoutBtcSentToUser",
            EventId::PegoutRefunded => "PegoutRefunded",
            EventId::NodeEclipse => "NodeEclipse",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// A peg-in quote was accepted and is waiting for the user's BTC.
    AcceptedPeginQuote { watched: WatchedPeginQuote },

    /// Call for user finished. `watched.retained.state` tells whether it
    /// succeeded, `error` carries the failure when it did not.
    CallForUserCompleted {
        watched: WatchedPeginQuote,
        error: Option<String>,
    },

    RegisterPeginCompleted {
        watched: WatchedPeginQuote,
        error: Option<String>,
    },

    /// A peg-out quote was accepted and is waiting for the user's RBTC.
    AcceptedPegoutQuote { watched: WatchedPegoutQuote },

    PegoutDepositConfirmed {
        watched: WatchedPegoutQuote,
        deposit: PegoutDeposit,
    },

    PegoutBtcSentToUser {
        watched: WatchedPegoutQuote,
        error: Option<String>,
    },

    PegoutRefunded {
        watched: WatchedPegoutQuote,
        error: Option<String>,
    },

    /// The node of `node_type` disagrees with the external sources.
    NodeEclipse {
        node_type: NodeType,
        eclipsed_block: BestBlock,
    },
}

impl Event {
    pub fn id(&self) -> EventId {
        match self {
            Event::AcceptedPeginQuote { .. } => EventId::AcceptedPeginQuote,
            Event::CallForUserCompleted { .. } => EventId::CallForUserCompleted,
            Event::RegisterPeginCompleted { .. } => EventId::RegisterPeginCompleted,
            Event::AcceptedPegoutQuote { .. } => EventId::AcceptedPegoutQuote,
            Event::PegoutDepositConfirmed { .. } => EventId::PegoutDepositConfirmed,
            Event::PegoutBtcSentToUser { .. } => EventId::PegoutBtcSentToUser,
            Event::PegoutRefunded { .. } => EventId::PegoutRefunded,
            Event::NodeEclipse { .. } => EventId::NodeEclipse,
        }
    }
}
