//! EPS AKA checks.
//!
//! With a subscriber profile loaded the analyzer recomputes the vector the
//! network should have used and holds both sides to it: the network's MAC
//! against XMAC, the UE's RES against XRES. Rejects and failures are then
//! judged against those outcomes and against the order they appear in.

use std::borrow::Cow;

use log::{debug, info, warn};

use super::analyzer::{ProcedureAnalyzer, Trace};
use super::context::{AuthenticationState, Landmark, SessionKeys, UeContext};
use crate::message::{Category, Message, Severity};
use crate::protocol::{EmmMessageType, parse_u8};
use crate::util::{HexFieldError, decode_hex_field};
use crate::vector::{VerificationUnavailable, compute_vector};

const RAND_FIELD: &str = "gsm_a.dtap.rand";
const AUTN_FIELD: &str = "gsm_a.dtap.autn";
const RES_FIELD: &str = "nas_eps.emm.res";
const CAUSE_FIELD: &str = "nas_eps.emm.cause";

/// EMM cause #20, MAC failure
const CAUSE_MAC_FAILURE: u8 = 20;

fn is_emm(msg: &Message, emm_type: EmmMessageType) -> bool {
    EmmMessageType::of(msg) == Some(emm_type)
}

#[derive(Default)]
pub struct AuthenticationAnalyzer {}

impl AuthenticationAnalyzer {
    pub fn new() -> Self {
        Self {}
    }

    /// Reads a hex parameter, reporting it on `msg` when it is missing or
    /// unreadable.
    fn parameter(msg: &mut Message, field: &str, name: &str) -> Option<Vec<u8>> {
        let value = msg.get(field).unwrap_or_default();
        match decode_hex_field(value) {
            Ok(bytes) => Some(bytes),
            Err(HexFieldError::Empty) => {
                msg.flag(Severity::Error, format!("{name} value not present."));
                None
            }
            Err(err) => {
                msg.note(format!("{name} value could not be read ({err}), treating it as absent."));
                msg.flag(Severity::Error, format!("{name} value not present."));
                None
            }
        }
    }

    fn request(&self, trace: &mut Trace, index: usize, ctx: &mut UeContext) {
        let Some(msg) = trace.get_mut(index) else {
            return;
        };
        ctx.authentication = AuthenticationState::default();
        ctx.landmarks.record(Landmark::AuthenticationRequest, msg.id());

        let rand = Self::parameter(msg, RAND_FIELD, "RAND");
        let autn = Self::parameter(msg, AUTN_FIELD, "AUTN");
        let (Some(rand), Some(autn)) = (rand, autn) else {
            return;
        };
        ctx.authentication.rand = Some(rand.clone());
        ctx.authentication.autn = Some(autn.clone());

        let vector = match compute_vector(ctx.sim_profile.as_ref(), &rand, &autn) {
            Ok(vector) => vector,
            Err(VerificationUnavailable::NoProfile) => {
                msg.note("No SIM info available.\nTo analyse authentication response, supply a subscriber profile.");
                return;
            }
            Err(err @ VerificationUnavailable::InvalidLength { .. }) => {
                msg.note(format!("RES value can not be analysed: {err}."));
                return;
            }
            Err(err) => {
                warn!("authentication request #{}: {err}", msg.id());
                msg.flag(
                    Severity::Warning,
                    format!("RES value can not be analysed, because {err}.\nTo analyse RES value, complete the subscriber profile."),
                );
                return;
            }
        };

        let mac_passed = vector.mac_matches();
        if !mac_passed {
            let id = msg.id();
            msg.flag(
                Severity::Error,
                format!(
                    "MAC ({}) does not match calculated value ({})",
                    hex::encode(&vector.mac),
                    hex::encode(&vector.xmac)
                ),
            );
            let failure_follows =
                trace.any_after(index, |m| is_emm(m, EmmMessageType::AuthenticationFailure));
            if !failure_follows {
                if let Some(msg) = trace.get_mut(index) {
                    msg.flag(
                        Severity::Error,
                        "No authentication failure message sent after mismatch in expected value.",
                    );
                }
            }
            info!("authentication request #{id}: network MAC does not verify");
        }
        debug!("derived XRES {}", hex::encode(&vector.xres));
        ctx.authentication.mac_passed = Some(mac_passed);
        ctx.authentication.xres = Some(vector.xres.clone());
        ctx.keys = Some(SessionKeys::from(&vector));
    }

    fn response(&self, trace: &mut Trace, index: usize, ctx: &mut UeContext) {
        let reject_follows =
            trace.any_after(index, |m| is_emm(m, EmmMessageType::AuthenticationReject));
        let Some(msg) = trace.get_mut(index) else {
            return;
        };
        ctx.landmarks.record(Landmark::AuthenticationResponse, msg.id());

        let Some(xres) = ctx.authentication.xres.as_deref() else {
            msg.note("RES value not analysed.");
            return;
        };
        let res = match decode_hex_field(msg.get(RES_FIELD).unwrap_or_default()) {
            Ok(res) => res,
            Err(err) => {
                msg.note(format!("RES value could not be read ({err}), treating it as absent."));
                return;
            }
        };

        if res == xres {
            ctx.authentication.passed = Some(true);
            return;
        }
        msg.flag(
            Severity::Error,
            format!(
                "RES ({}) does not match expected value ({})",
                hex::encode(&res),
                hex::encode(xres)
            ),
        );
        ctx.authentication.passed = Some(false);
        if !reject_follows {
            msg.flag(
                Severity::Error,
                "No authentication reject was sent after mismatch in RES values.",
            );
        }
    }

    fn reject(&self, msg: &mut Message, ctx: &mut UeContext) {
        let response = ctx.landmarks.get(Landmark::AuthenticationResponse);
        ctx.landmarks.record(Landmark::AuthenticationReject, msg.id());
        match response {
            Some(response) if response <= msg.id() => match ctx.authentication.passed {
                None => msg.note(
                    "RES was not analysed in authentication response.\nTo analyse RES, supply a subscriber profile.",
                ),
                Some(true) => msg.flag(
                    Severity::Error,
                    "Authentication reject was sent, though RES matched XRES.",
                ),
                Some(false) => {}
            },
            _ => {
                warn!("authentication reject #{} precedes any authentication response", msg.id());
                msg.flag(
                    Severity::SeriousError,
                    "Authentication reject sent before authentication response.\nThis could be because of a malicious eNodeB carrying out a disruption of service attack.",
                );
            }
        }
    }

    fn failure(&self, msg: &mut Message, ctx: &mut UeContext) {
        let request = ctx.landmarks.get(Landmark::AuthenticationRequest);
        ctx.landmarks.record(Landmark::AuthenticationFailure, msg.id());
        match request {
            Some(request) if request <= msg.id() => {
                let mac_failure = msg.get(CAUSE_FIELD).and_then(parse_u8) == Some(CAUSE_MAC_FAILURE);
                match ctx.authentication.mac_passed {
                    None => msg.note(
                        "MAC was not analysed in authentication request.\nTo analyse MAC, supply a subscriber profile.",
                    ),
                    Some(true) if mac_failure => msg.flag(
                        Severity::Error,
                        "Authentication failure was sent with cause 20 (MAC failure), though MAC was as expected.",
                    ),
                    Some(_) => {}
                }
            }
            _ => msg.flag(
                Severity::Error,
                "Authentication failure sent before authentication request.",
            ),
        }
    }
}

impl ProcedureAnalyzer for AuthenticationAnalyzer {
    fn get_name(&self) -> Cow<'_, str> {
        "Authentication Procedure".into()
    }

    fn get_description(&self) -> Cow<'_, str> {
        "Recomputes the authentication vector from the subscriber profile and checks MAC, \
         RES and the ordering and justification of authentication rejects and failures."
            .into()
    }

    fn get_version(&self) -> u32 {
        1
    }

    fn category(&self) -> Category {
        Category::AuthenticationProcedure
    }

    fn analyze(&mut self, trace: &mut Trace, selection: &[usize], ctx: &mut UeContext) {
        for &index in selection {
            let Some(emm_type) = trace.get(index).and_then(EmmMessageType::of) else {
                if let Some(msg) = trace.get_mut(index) {
                    msg.add_category(Category::Analysed);
                }
                continue;
            };
            match emm_type {
                EmmMessageType::AuthenticationRequest => self.request(trace, index, ctx),
                EmmMessageType::AuthenticationResponse => self.response(trace, index, ctx),
                EmmMessageType::AuthenticationReject => {
                    if let Some(msg) = trace.get_mut(index) {
                        self.reject(msg, ctx);
                    }
                }
                EmmMessageType::AuthenticationFailure => {
                    if let Some(msg) = trace.get_mut(index) {
                        self.failure(msg, ctx);
                    }
                }
                _ => {}
            }
            if let Some(msg) = trace.get_mut(index) {
                msg.add_category(Category::Analysed);
            }
        }
    }
}
