//! Identity request/response checks.
//!
//! srsRAN's MME only ever asks for the IMSI, so anything else is reported but
//! analysed on a best-effort basis. Responses are checked against the identity
//! type that was asked for and, when a subscriber profile is loaded, against
//! the IMSI it holds.

use std::borrow::Cow;

use log::{debug, warn};

use super::analyzer::{ProcedureAnalyzer, Trace};
use super::context::{Landmark, UeContext};
use crate::message::{Category, Finding, Message, Severity};
use crate::protocol::{EmmMessageType, IdentityType};

const REQUESTED_TYPE_FIELD: &str = "nas_eps.emm.id_type2";
const RESPONSE_TYPE_FIELD: &str = "gsm_a.ie.mobileid_type";
const IMSI_FIELD: &str = "e212.imsi";

#[derive(Default)]
pub struct IdentityAnalyzer {}

impl IdentityAnalyzer {
    pub fn new() -> Self {
        Self {}
    }

    fn request(&self, msg: &mut Message, ctx: &mut UeContext) {
        let requested = msg.get(REQUESTED_TYPE_FIELD).and_then(IdentityType::parse);
        if requested != Some(IdentityType::Imsi) {
            msg.note("ELVis only follows srsRAN implementation, which only requests IMSI.");
            msg.add_finding(Finding::with_label(
                Severity::Note,
                "Analysis results might not be completely accurate.",
                "\t",
            ));
        }
        debug!("identity request #{} asks for {:?}", msg.id(), requested);
        ctx.identity_request_type = requested;
        ctx.landmarks.record(Landmark::IdentityRequest, msg.id());
    }

    fn response(&self, msg: &mut Message, ctx: &mut UeContext) {
        let returned = msg.get(RESPONSE_TYPE_FIELD).and_then(IdentityType::parse);
        if returned != ctx.identity_request_type {
            msg.flag(
                Severity::Error,
                "Identity response does not contain queried value by MME.",
            );
        }

        if ctx.identity_request_type != Some(IdentityType::Imsi) {
            return;
        }
        let observed = msg.get(IMSI_FIELD).map(str::to_string);
        match ctx.sim_profile.as_mut() {
            None => msg.note("IMSI not loaded into program.\nTo load IMSI in program, supply a subscriber profile."),
            Some(profile) => {
                if let Some(known) = profile.imsi.as_deref() {
                    if observed.as_deref() != Some(known) {
                        warn!("IMSI {:?} in identity response #{} differs from profile", observed, msg.id());
                        msg.flag(
                            Severity::Warning,
                            "IMSI in response does not match value from SIM configuration.",
                        );
                        msg.note("Changing stored value to value read from identity response.");
                        profile.imsi = observed.clone();
                    }
                }
            }
        }
        ctx.imsi = observed;
    }
}

impl ProcedureAnalyzer for IdentityAnalyzer {
    fn get_name(&self) -> Cow<'_, str> {
        "Identity Request/Response".into()
    }

    fn get_description(&self) -> Cow<'_, str> {
        "Checks that identity responses carry the identity type the MME asked for, and \
         that a returned IMSI matches the subscriber profile."
            .into()
    }

    fn get_version(&self) -> u32 {
        1
    }

    fn category(&self) -> Category {
        Category::IdentityRequestResponse
    }

    fn analyze(&mut self, trace: &mut Trace, selection: &[usize], ctx: &mut UeContext) {
        for &index in selection {
            let Some(msg) = trace.get_mut(index) else {
                continue;
            };
            match EmmMessageType::of(msg) {
                Some(EmmMessageType::IdentityRequest) => self.request(msg, ctx),
                Some(EmmMessageType::IdentityResponse) => self.response(msg, ctx),
                _ => {}
            }
            msg.add_category(Category::Analysed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SimProfile;
    use crate::protocol::EMM_TYPE_FIELD;

    fn identity_request(id: usize, id_type: &str) -> Message {
        Message::new(id, "DLInformationTransfer, Identity request")
            .with_field(EMM_TYPE_FIELD, "85")
            .with_field(REQUESTED_TYPE_FIELD, id_type)
    }

    fn identity_response(id: usize, id_type: &str, imsi: &str) -> Message {
        Message::new(id, "ULInformationTransfer, Identity response")
            .with_field(EMM_TYPE_FIELD, "86")
            .with_field(RESPONSE_TYPE_FIELD, id_type)
            .with_field(IMSI_FIELD, imsi)
    }

    fn run(messages: Vec<Message>, profile: Option<SimProfile>) -> (Trace, UeContext) {
        let mut trace = Trace::new(messages);
        trace.classify();
        let mut ctx = UeContext::new(profile);
        let selection = trace.indices(Category::IdentityRequestResponse);
        IdentityAnalyzer::new().analyze(&mut trace, &selection, &mut ctx);
        (trace, ctx)
    }

    #[test]
    fn test_non_imsi_request_noted() {
        let (trace, ctx) = run(vec![identity_request(0, "2")], None);
        let msg = &trace.messages()[0];
        assert_eq!(ctx.identity_request_type, Some(IdentityType::Imei));
        assert_eq!(msg.findings().len(), 2);
        assert!(msg.findings()[0].text().contains("srsRAN"));
        assert_eq!(msg.findings()[1].label(), Some("\t"));
        assert_eq!(msg.severity(), 0);
        assert!(msg.has_category(Category::Analysed));
    }

    #[test]
    fn test_imsi_response_without_profile() {
        let (trace, ctx) = run(
            vec![identity_request(0, "1"), identity_response(1, "1", "001010123456789")],
            None,
        );
        assert!(trace.messages()[0].findings().is_empty());
        let response = &trace.messages()[1];
        assert_eq!(response.findings().len(), 1);
        assert!(response.findings()[0].text().starts_with("IMSI not loaded"));
        assert_eq!(ctx.imsi.as_deref(), Some("001010123456789"));
    }

    #[test]
    fn test_response_type_mismatch() {
        let (trace, _) = run(
            vec![identity_request(0, "1"), identity_response(1, "2", "")],
            Some(SimProfile::default()),
        );
        let response = &trace.messages()[1];
        assert_eq!(response.findings()[0].severity(), Severity::Error);
        assert_eq!(response.severity(), 3);
    }

    #[test]
    fn test_imsi_mismatch_updates_profile() {
        let profile = SimProfile {
            imsi: Some("001010000000001".to_string()),
            ..Default::default()
        };
        let (trace, ctx) = run(
            vec![identity_request(0, "1"), identity_response(1, "1", "001010123456789")],
            Some(profile),
        );
        let response = &trace.messages()[1];
        let severities: Vec<Severity> = response.findings().iter().map(|f| f.severity()).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Note]);
        assert_eq!(
            ctx.sim_profile.and_then(|p| p.imsi).as_deref(),
            Some("001010123456789")
        );
    }

    #[test]
    fn test_matching_imsi_is_clean() {
        let profile = SimProfile {
            imsi: Some("001010123456789".to_string()),
            ..Default::default()
        };
        let (trace, _) = run(
            vec![identity_request(0, "1"), identity_response(1, "1", "001010123456789")],
            Some(profile),
        );
        assert!(trace.messages().iter().all(|m| m.findings().is_empty()));
        assert!(trace.messages().iter().all(|m| m.has_category(Category::Analysed)));
    }
}
