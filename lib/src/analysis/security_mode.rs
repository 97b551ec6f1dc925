//! Security mode command checks for both the NAS and the RRC layer.
//!
//! Each command is checked against what the UE announced in its attach
//! request: the capabilities it replays must be unchanged, the algorithms the
//! network picks must be ones the UE supports, and null algorithms are called
//! out. The RRC choice is remembered so PDCP can be held to it later on.

use std::borrow::Cow;

use log::{debug, info};

use super::analyzer::{ProcedureAnalyzer, Trace};
use super::context::{Landmark, UeContext};
use crate::message::{Category, Finding, Message, Severity};
use crate::protocol::{
    AlgorithmFamily, EmmMessageType, PDCP_CIPHERING_FIELD, PDCP_INTEGRITY_FIELD, RrcElement,
    SecurityAlgorithm,
};

const NAS_CIPHERING_FIELD: &str = "nas_eps.emm.toc";
const NAS_INTEGRITY_FIELD: &str = "nas_eps.emm.toi";
const RRC_CIPHERING_FIELD: &str = "lte-rrc.cipheringAlgorithm";
const RRC_INTEGRITY_FIELD: &str = "lte-rrc.integrityProtAlgorithm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Nas,
    Rrc,
}

impl Track {
    fn name(&self) -> &'static str {
        match self {
            Track::Nas => "NAS",
            Track::Rrc => "RRC",
        }
    }

    fn algorithm_fields(&self) -> (&'static str, &'static str) {
        match self {
            Track::Nas => (NAS_CIPHERING_FIELD, NAS_INTEGRITY_FIELD),
            Track::Rrc => (RRC_CIPHERING_FIELD, RRC_INTEGRITY_FIELD),
        }
    }

    fn incapable_text(&self, family: AlgorithmFamily) -> &'static str {
        match (self, family) {
            (Track::Nas, AlgorithmFamily::Ciphering) => {
                "UE not capable of using NAS chosen ciphering algorithm."
            }
            (Track::Nas, AlgorithmFamily::Integrity) => {
                "UE not capable of using NAS chosen integrity algorithm."
            }
            (Track::Rrc, AlgorithmFamily::Ciphering) => {
                "UE not capable of RRC chosen ciphering algorithm."
            }
            (Track::Rrc, AlgorithmFamily::Integrity) => {
                "UE not capable of RRC chosen integrity protection algorithm."
            }
        }
    }

    /// Whether `msg` is the failure answer to a command on this track.
    fn is_failure(&self, msg: &Message) -> bool {
        match self {
            Track::Nas => EmmMessageType::of(msg) == Some(EmmMessageType::SecurityModeReject),
            Track::Rrc => RrcElement::SecurityModeFailure.is_present(msg),
        }
    }

    fn command_landmark(&self) -> Landmark {
        match self {
            Track::Nas => Landmark::NasSecurityModeCommand,
            Track::Rrc => Landmark::RrcSecurityModeCommand,
        }
    }
}

/// What a message in the security mode partition calls for.
enum Step {
    Command(Track),
    RrcComplete,
    Landmark(Landmark, usize),
    Other,
}

impl Step {
    fn of(msg: &Message) -> Self {
        match EmmMessageType::of(msg) {
            Some(EmmMessageType::SecurityModeCommand) => Step::Command(Track::Nas),
            Some(EmmMessageType::SecurityModeComplete) => {
                Step::Landmark(Landmark::NasSecurityModeComplete, msg.id())
            }
            Some(EmmMessageType::SecurityModeReject) => {
                Step::Landmark(Landmark::NasSecurityModeReject, msg.id())
            }
            _ if RrcElement::SecurityModeCommand.is_present(msg) => Step::Command(Track::Rrc),
            _ if RrcElement::SecurityModeComplete.is_present(msg) => Step::RrcComplete,
            _ if RrcElement::SecurityModeFailure.is_present(msg) => {
                Step::Landmark(Landmark::RrcSecurityModeFailure, msg.id())
            }
            _ => Step::Other,
        }
    }
}

fn chosen(msg: &Message, field: &str, family: AlgorithmFamily) -> Option<SecurityAlgorithm> {
    msg.get(field).and_then(|value| SecurityAlgorithm::parse(family, value))
}

#[derive(Default)]
pub struct SecurityModeAnalyzer {}

impl SecurityModeAnalyzer {
    pub fn new() -> Self {
        Self {}
    }

    fn command(&self, trace: &mut Trace, index: usize, track: Track, ctx: &mut UeContext) {
        let failure_sent = trace.position(|m| track.is_failure(m)).is_some();
        let Some(msg) = trace.get_mut(index) else {
            return;
        };

        // RRC commands never replay capabilities; a NAS command must replay all of them
        let reported = ctx.security_capabilities.reported_by(msg);
        let replay_expected = track == Track::Nas || !reported.is_empty();
        if replay_expected && reported != ctx.security_capabilities {
            msg.flag(
                Severity::Warning,
                format!(
                    "Security capabilities in {} security mode command do not match capabilities in attach request.",
                    track.name()
                ),
            );
        }

        let (ciphering_field, integrity_field) = track.algorithm_fields();
        let ciphering = chosen(msg, ciphering_field, AlgorithmFamily::Ciphering);
        let integrity = chosen(msg, integrity_field, AlgorithmFamily::Integrity);
        debug!(
            "{} security mode command #{}: {:?} / {:?}",
            track.name(),
            msg.id(),
            ciphering,
            integrity
        );

        let mut incapable = false;
        for algorithm in [ciphering, integrity].into_iter().flatten() {
            if ctx.security_capabilities.supports(&algorithm) == Some(false) {
                msg.flag(Severity::Error, track.incapable_text(algorithm.family));
                incapable = true;
            }
        }
        if incapable && !failure_sent {
            msg.add_finding(Finding::with_label(
                Severity::SeriousWarning,
                "UE has not sent a failure message for incapability.",
                "\t",
            ));
        }

        if let Some(ciphering) = ciphering {
            if ciphering.is_null() {
                msg.flag(
                    Severity::Warning,
                    "Null ciphering algorithm in use. Data is not encrypted over air interface.\nData could be read by third parties.",
                );
            } else {
                msg.note("Because of ciphered data, analysis past this point is limited.");
            }
        }
        if integrity.is_some_and(|ia| ia.is_null()) {
            msg.flag(
                Severity::SeriousWarning,
                "No integrity protection algorithm in use.\nData could be tampered with by third parties.",
            );
        }

        match track {
            Track::Nas => {
                ctx.chosen.nas_ciphering = ciphering;
                ctx.chosen.nas_integrity = integrity;
            }
            Track::Rrc => {
                ctx.chosen.rrc_ciphering = ciphering;
                ctx.chosen.rrc_integrity = integrity;
            }
        }
        ctx.landmarks.record(track.command_landmark(), msg.id());
        info!("{} security activated by command #{}", track.name(), msg.id());
    }

    fn rrc_complete(&self, msg: &mut Message, ctx: &mut UeContext) {
        ctx.landmarks.record(Landmark::RrcSecurityModeComplete, msg.id());
        if let Some(expected) = ctx.chosen.rrc_ciphering {
            if chosen(msg, PDCP_CIPHERING_FIELD, AlgorithmFamily::Ciphering) != Some(expected) {
                msg.flag(
                    Severity::Warning,
                    "PDCP does not use configured RRC ciphering algorithm.",
                );
            }
        }
        if let Some(expected) = ctx.chosen.rrc_integrity {
            if chosen(msg, PDCP_INTEGRITY_FIELD, AlgorithmFamily::Integrity) != Some(expected) {
                msg.flag(
                    Severity::Warning,
                    "PDCP does not use configured RRC integrity protection algorithm.",
                );
            }
        }
    }
}

impl ProcedureAnalyzer for SecurityModeAnalyzer {
    fn get_name(&self) -> Cow<'_, str> {
        "Security Mode Command".into()
    }

    fn get_description(&self) -> Cow<'_, str> {
        "Checks NAS and RRC security mode commands against the UE's announced security \
         capabilities and flags null ciphering or integrity algorithms."
            .into()
    }

    fn get_version(&self) -> u32 {
        1
    }

    fn category(&self) -> Category {
        Category::SecurityModeCommand
    }

    fn analyze(&mut self, trace: &mut Trace, selection: &[usize], ctx: &mut UeContext) {
        for &index in selection {
            let Some(step) = trace.get(index).map(Step::of) else {
                continue;
            };
            match step {
                Step::Command(track) => self.command(trace, index, track, ctx),
                Step::Landmark(landmark, id) => ctx.landmarks.record(landmark, id),
                Step::RrcComplete => {
                    if let Some(msg) = trace.get_mut(index) {
                        self.rrc_complete(msg, ctx);
                    }
                }
                Step::Other => {}
            }
            if let Some(msg) = trace.get_mut(index) {
                msg.add_category(Category::Analysed);
            }
        }
    }
}
