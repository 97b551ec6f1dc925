//! Assigns procedure categories to messages based on their summary line.
//!
//! Categories decide which procedure analyzers get to see a message. The
//! rules are purely lexical: Wireshark summaries name the RRC message type
//! and the embedded NAS message (e.g. `RRCConnectionSetupComplete, Attach
//! request`), which is enough to place a message in a procedure.

use crate::message::{Categories, Category, Message};

/// Summary substrings and the category each one implies, in priority order.
const RULES: &[(&[&str], Category)] = &[
    (&["RRCConnection"], Category::RrcConnectionEstablishment),
    (&["Attach"], Category::AttachProcedure),
    (&["InformationTransfer"], Category::InformationTransfer),
    (&["Identity"], Category::IdentityRequestResponse),
    (&["Authentication"], Category::AuthenticationProcedure),
    (&["SecurityMode", "Security mode"], Category::SecurityModeCommand),
    (&["UECapability"], Category::UeCapabilityInformation),
];

/// These sub-procedures only ever run inside an attach.
const ATTACH_SUBPROCEDURES: &[Category] = &[
    Category::InformationTransfer,
    Category::SecurityModeCommand,
    Category::UeCapabilityInformation,
];

pub fn classify(msg: &Message) -> Categories {
    let summary = msg.summary();
    let mut categories = Categories::new();
    for (needles, category) in RULES {
        if needles.iter().any(|needle| summary.contains(needle)) {
            categories.insert(*category);
        }
    }

    if ATTACH_SUBPROCEDURES.iter().any(|c| categories.contains(*c)) {
        categories.insert(Category::AttachProcedure);
    }
    // detach summaries overlap lexically with attach framing
    if summary.contains("Detach") {
        categories.remove(Category::AttachProcedure);
    }

    if categories.is_empty() {
        categories.insert(Category::Unassigned);
    }
    categories
}
