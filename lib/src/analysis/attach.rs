//! Checks that span the whole attach procedure rather than one message
//! exchange: whether it completed at all, which radio bearers and RLC mode
//! carried it, when UE capabilities went out, and whether PDCP kept using
//! the algorithms RRC configured.

use std::borrow::Cow;

use log::{debug, info};

use super::analyzer::{ProcedureAnalyzer, Trace};
use super::context::{Landmark, UeContext};
use crate::message::{Category, Message, Severity};
use crate::protocol::{
    AlgorithmFamily, Bearer, ChannelType, EmmMessageType, PDCP_CIPHERING_FIELD,
    PDCP_INTEGRITY_FIELD, RlcMode, RrcElement, SecurityAlgorithm, is_nas_ciphered,
};

const RECONFIGURATION_SUMMARY: &str = "RRCConnectionReconfiguration";
const CAPABILITY_SUMMARY: &str = "UECapabilityInformation";

const SRB1: u8 = 1;
const SRB2: u8 = 2;

fn is_rrc(msg: &Message) -> bool {
    msg.summary().contains("RRC") || msg.fields().iter().any(|(name, _)| name.starts_with("lte-rrc."))
}

#[derive(Default)]
pub struct AttachAnalyzer {}

impl AttachAnalyzer {
    pub fn new() -> Self {
        Self {}
    }

    /// An attach that never reaches RRC connection reconfiguration stalled
    /// somewhere. If the capture goes on afterwards, the network most likely
    /// dropped a message it could not verify.
    fn check_completion(&self, trace: &mut Trace, selection: &[usize]) {
        let reconfigured = trace.messages().iter().any(|msg| {
            msg.summary().contains(RECONFIGURATION_SUMMARY)
                || RrcElement::ConnectionReconfiguration.is_present(msg)
        });
        if reconfigured {
            return;
        }
        let Some(&last_attach) = selection.last() else {
            return;
        };
        let capture_ends_here = last_attach + 1 == trace.len();
        let Some(msg) = trace.get_mut(last_attach) else {
            return;
        };
        info!("attach procedure incomplete, last attach message #{}", msg.id());
        if capture_ends_here {
            msg.note("Attach procedure incomplete.\nIf there are no possible causes listed in this packet, it might be because of an invalid MAC.");
        } else {
            msg.flag(
                Severity::Error,
                "Attach procedure incomplete.\nThis might be because of an invalid PDCP MAC.",
            );
        }
    }

    /// Until reconfiguration sets up SRB2 the attach runs on SRB1; afterwards
    /// NAS signalling moves over to SRB2.
    fn check_bearers(
        &self,
        trace: &mut Trace,
        selection: &[usize],
        setup: usize,
        reconfiguration: Option<usize>,
    ) {
        if let Some(reconfiguration) = reconfiguration {
            if let Some(msg) = trace.get_mut(reconfiguration) {
                if !RrcElement::SrbToAddMod.is_present(msg) {
                    msg.flag(
                        Severity::Warning,
                        "RRC connection reconfiguration does not set up a signalling radio bearer.",
                    );
                }
            }
        }

        for &index in selection.iter().filter(|&&index| index > setup) {
            let Some(msg) = trace.get_mut(index) else {
                continue;
            };
            let Some(bearer) = Bearer::of(msg) else {
                continue;
            };
            if bearer.channel_type != ChannelType::Srb {
                msg.flag(
                    Severity::SeriousError,
                    format!(
                        "Attach message sent on {:?} channel instead of a signalling radio bearer.",
                        bearer.channel_type
                    ),
                );
                continue;
            }
            let Some(id) = bearer.id else {
                continue;
            };
            let before_reconfiguration = reconfiguration.is_none_or(|r| index <= r);
            if before_reconfiguration {
                if id != SRB1 && !is_nas_ciphered(msg) {
                    msg.flag(
                        Severity::SeriousError,
                        format!("Attach message sent on SRB{id} before SRB2 was set up."),
                    );
                }
            } else if id == SRB1 {
                msg.flag(
                    Severity::Warning,
                    "Attach message sent on SRB1 after SRB2 was set up.",
                );
            } else if id != SRB2 {
                msg.flag(
                    Severity::SeriousError,
                    format!("Attach message sent on SRB{id} instead of SRB2."),
                );
            }
        }
    }

    fn check_rlc_mode(&self, trace: &mut Trace, selection: &[usize], setup: usize) {
        for &index in selection.iter().filter(|&&index| index >= setup) {
            let Some(msg) = trace.get_mut(index) else {
                continue;
            };
            match RlcMode::of(msg) {
                Some(RlcMode::Acknowledged) | None => {}
                Some(mode) => msg.flag(
                    Severity::Warning,
                    format!("Attach message sent in RLC {mode:?} mode instead of acknowledged mode."),
                ),
            }
        }
    }

    fn check_capability_timing(&self, trace: &mut Trace, selection: &[usize], ctx: &UeContext) {
        let security = ctx
            .landmarks
            .get(Landmark::RrcSecurityModeCommand)
            .or_else(|| ctx.landmarks.get(Landmark::NasSecurityModeCommand));
        for &index in selection {
            let Some(msg) = trace.get_mut(index) else {
                continue;
            };
            if !msg.summary().contains(CAPABILITY_SUMMARY) {
                continue;
            }
            if security.is_none_or(|security| msg.id() < security) {
                msg.flag(
                    Severity::Warning,
                    "UE capability information sent before security activation.\nCapabilities could be read or altered by third parties.",
                );
            }
        }
    }

    /// Every RRC message after the RRC security mode command must be
    /// protected with the algorithms it configured.
    fn recheck_pdcp(&self, trace: &mut Trace, rrc_command: usize, ctx: &UeContext) {
        let checks: [(&str, Option<SecurityAlgorithm>, AlgorithmFamily, &str); 2] = [
            (
                PDCP_CIPHERING_FIELD,
                ctx.chosen.rrc_ciphering,
                AlgorithmFamily::Ciphering,
                "PDCP ciphering algorithm does not match configured algorithm.",
            ),
            (
                PDCP_INTEGRITY_FIELD,
                ctx.chosen.rrc_integrity,
                AlgorithmFamily::Integrity,
                "PDCP integrity algorithm does not match configured algorithm.",
            ),
        ];
        let Some(start) = trace.position(|msg| msg.id() == rrc_command) else {
            return;
        };
        for index in start + 1..trace.len() {
            let Some(msg) = trace.get_mut(index) else {
                continue;
            };
            if !is_rrc(msg) || !(msg.has_field(PDCP_CIPHERING_FIELD) || msg.has_field(PDCP_INTEGRITY_FIELD)) {
                continue;
            }
            for (field, expected, family, text) in checks {
                let (Some(expected), Some(value)) = (expected, msg.get(field)) else {
                    continue;
                };
                if SecurityAlgorithm::parse(family, value) != Some(expected) {
                    msg.flag(Severity::SeriousWarning, text);
                }
            }
            msg.add_category(Category::Analysed);
        }
    }
}

impl ProcedureAnalyzer for AttachAnalyzer {
    fn get_name(&self) -> Cow<'_, str> {
        "Attach Procedure".into()
    }

    fn get_description(&self) -> Cow<'_, str> {
        "Detects incomplete attaches that hint at PDCP MAC failures, checks radio bearers, \
         RLC mode and capability timing, and re-checks PDCP security after RRC security \
         activation."
            .into()
    }

    fn get_version(&self) -> u32 {
        1
    }

    fn category(&self) -> Category {
        Category::AttachProcedure
    }

    fn analyze(&mut self, trace: &mut Trace, selection: &[usize], ctx: &mut UeContext) {
        self.check_completion(trace, selection);

        let setup = trace.position(|msg| EmmMessageType::of(msg) == Some(EmmMessageType::AttachRequest));
        let reconfiguration =
            trace.position(|msg| EmmMessageType::of(msg) == Some(EmmMessageType::AttachAccept));
        for (landmark, index) in [
            (Landmark::ConnectionSetupComplete, setup),
            (Landmark::ConnectionReconfiguration, reconfiguration),
        ] {
            if let Some(msg) = index.and_then(|index| trace.get(index)) {
                ctx.landmarks.record(landmark, msg.id());
            }
        }

        match setup {
            Some(setup) => {
                self.check_bearers(trace, selection, setup, reconfiguration);
                self.check_rlc_mode(trace, selection, setup);
            }
            None => debug!("no connection setup complete carrying an attach request, skipping bearer checks"),
        }
        self.check_capability_timing(trace, selection, ctx);

        for &index in selection {
            if let Some(msg) = trace.get_mut(index) {
                msg.add_category(Category::Analysed);
            }
        }

        if let Some(rrc_command) = ctx.landmarks.get(Landmark::RrcSecurityModeCommand) {
            self.recheck_pdcp(trace, rrc_command, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        EMM_TYPE_FIELD, NAS_SECURITY_HEADER_FIELD, RLC_CHANNEL_ID_FIELD, RLC_CHANNEL_TYPE_FIELD,
        RLC_MODE_FIELD,
    };

    fn on_srb(msg: Message, id: &str) -> Message {
        msg.with_field(RLC_CHANNEL_TYPE_FIELD, "4")
            .with_field(RLC_CHANNEL_ID_FIELD, id)
            .with_field(RLC_MODE_FIELD, "4")
    }

    fn setup_complete(id: usize) -> Message {
        on_srb(
            Message::new(id, "RRCConnectionSetupComplete, Attach request, PDN connectivity request")
                .with_field(EMM_TYPE_FIELD, "65"),
            "1",
        )
    }

    fn reconfiguration(id: usize) -> Message {
        on_srb(
            Message::new(id, "RRCConnectionReconfiguration, Attach accept")
                .with_field(EMM_TYPE_FIELD, "66")
                .with_field(RrcElement::SrbToAddMod.field_name(), "SRB-ToAddMod"),
            "1",
        )
    }

    fn attach_complete(id: usize, srb: &str) -> Message {
        on_srb(Message::new(id, "ULInformationTransfer, Attach complete"), srb)
    }

    fn run(messages: Vec<Message>, ctx: &mut UeContext) -> Trace {
        let mut trace = Trace::new(messages);
        trace.classify();
        let selection = trace.indices(Category::AttachProcedure);
        AttachAnalyzer::new().analyze(&mut trace, &selection, ctx);
        trace
    }

    #[test]
    fn test_truncated_attach_is_a_note() {
        let trace = run(
            vec![Message::new(0, "RRCConnectionRequest"), setup_complete(1)],
            &mut UeContext::new(None),
        );
        let msg = &trace.messages()[1];
        assert_eq!(msg.findings().len(), 1);
        assert_eq!(msg.findings()[0].severity(), Severity::Note);
        assert!(msg.has_category(Category::Analysed));
    }

    #[test]
    fn test_stalled_attach_is_an_error() {
        let trace = run(
            vec![setup_complete(0), Message::new(1, "RRCConnectionRelease")],
            &mut UeContext::new(None),
        );
        assert_eq!(trace.messages()[0].findings()[0].severity(), Severity::Error);
        assert!(trace.messages()[1].findings().is_empty());
    }

    #[test]
    fn test_clean_attach() {
        let mut ctx = UeContext::new(None);
        let trace = run(
            vec![setup_complete(0), reconfiguration(1), attach_complete(2, "2")],
            &mut ctx,
        );
        assert!(trace.messages().iter().all(|m| m.findings().is_empty()));
        assert_eq!(ctx.landmarks.get(Landmark::ConnectionSetupComplete), Some(0));
        assert_eq!(ctx.landmarks.get(Landmark::ConnectionReconfiguration), Some(1));
    }

    #[test]
    fn test_wrong_bearers() {
        let early = on_srb(
            Message::new(1, "ULInformationTransfer, Identity response"),
            "2",
        );
        let early_ciphered = on_srb(
            Message::new(2, "ULInformationTransfer, Security mode complete"),
            "2",
        )
        .with_field(NAS_SECURITY_HEADER_FIELD, "4");
        let trace = run(
            vec![
                setup_complete(0),
                early,
                early_ciphered,
                reconfiguration(3),
                attach_complete(4, "1"),
            ],
            &mut UeContext::new(None),
        );
        assert_eq!(trace.messages()[1].findings()[0].severity(), Severity::SeriousError);
        assert!(trace.messages()[2].findings().is_empty());
        assert_eq!(trace.messages()[4].findings()[0].severity(), Severity::Warning);
    }

    #[test]
    fn test_data_bearer_and_rlc_mode() {
        let on_drb = Message::new(1, "ULInformationTransfer, Attach complete")
            .with_field(RLC_CHANNEL_TYPE_FIELD, "5")
            .with_field(RLC_CHANNEL_ID_FIELD, "3")
            .with_field(RLC_MODE_FIELD, "2");
        let trace = run(
            vec![setup_complete(0), on_drb, reconfiguration(2)],
            &mut UeContext::new(None),
        );
        let severities: Vec<Severity> =
            trace.messages()[1].findings().iter().map(|f| f.severity()).collect();
        assert_eq!(severities, vec![Severity::SeriousError, Severity::Warning]);
    }

    #[test]
    fn test_reconfiguration_without_srb() {
        let bare = on_srb(
            Message::new(1, "RRCConnectionReconfiguration, Attach accept").with_field(EMM_TYPE_FIELD, "66"),
            "1",
        );
        let trace = run(vec![setup_complete(0), bare], &mut UeContext::new(None));
        assert_eq!(trace.messages()[1].findings()[0].severity(), Severity::Warning);
    }

    #[test]
    fn test_capabilities_before_security() {
        let mut ctx = UeContext::new(None);
        ctx.landmarks.record(Landmark::RrcSecurityModeCommand, 3);
        let trace = run(
            vec![
                setup_complete(0),
                on_srb(Message::new(1, "UECapabilityInformation"), "1"),
                reconfiguration(2),
                Message::new(3, "SecurityModeCommand"),
                on_srb(Message::new(4, "UECapabilityInformation"), "1"),
            ],
            &mut ctx,
        );
        assert_eq!(trace.messages()[1].findings().len(), 1);
        assert!(trace.messages()[1].findings()[0].text().starts_with("UE capability information"));
        assert!(
            trace.messages()[4]
                .findings()
                .iter()
                .all(|f| !f.text().starts_with("UE capability information"))
        );
    }

    #[test]
    fn test_pdcp_recheck_after_rrc_security() {
        let mut ctx = UeContext::new(None);
        ctx.landmarks.record(Landmark::RrcSecurityModeCommand, 1);
        ctx.chosen.rrc_ciphering = Some(SecurityAlgorithm::ciphering(2));
        ctx.chosen.rrc_integrity = Some(SecurityAlgorithm::integrity(2));
        let reconfig = reconfiguration(2)
            .with_field(PDCP_CIPHERING_FIELD, "0")
            .with_field(PDCP_INTEGRITY_FIELD, "2");
        let trace = run(
            vec![setup_complete(0), Message::new(1, "SecurityModeCommand"), reconfig],
            &mut ctx,
        );
        let msg = &trace.messages()[2];
        assert_eq!(msg.findings().len(), 1);
        assert_eq!(msg.findings()[0].severity(), Severity::SeriousWarning);
        assert!(msg.findings()[0].text().starts_with("PDCP ciphering"));
    }
}
