use std::borrow::Cow;
use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::attach::AttachAnalyzer;
use super::authentication::AuthenticationAnalyzer;
use super::classifier;
use super::context::UeContext;
use super::identity::IdentityAnalyzer;
use super::security_mode::SecurityModeAnalyzer;
use crate::message::{Category, Message, Severity};
use crate::profile::SimProfile;

/// Conditions that make a whole capture unanalysable. Everything else ends up
/// as a finding on some message.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no attach request found, making it impossible to receive UE information")]
    MissingUserEquipmentInfo,
}

/// Qualitative toggles for each procedure analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub identity: bool,
    pub authentication: bool,
    pub security_mode: bool,
    pub attach: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            identity: true,
            authentication: true,
            security_mode: true,
            attach: true,
        }
    }
}

/// The messages of one capture, in capture order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    messages: Vec<Message>,
}

impl Trace {
    pub fn new(messages: Vec<Message>) -> Self {
        Trace { messages }
    }

    /// Tags every message with its procedure categories.
    pub fn classify(&mut self) {
        for msg in &mut self.messages {
            msg.set_categories(classifier::classify(msg));
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.messages.get_mut(index)
    }

    /// Indices of the messages tagged with `category`.
    pub fn indices(&self, category: Category) -> Vec<usize> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, msg)| msg.has_category(category))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether any message after `index` satisfies `predicate`.
    pub fn any_after(&self, index: usize, predicate: impl Fn(&Message) -> bool) -> bool {
        self.messages.iter().skip(index + 1).any(predicate)
    }

    /// Index of the first message satisfying `predicate`.
    pub fn position(&self, predicate: impl Fn(&Message) -> bool) -> Option<usize> {
        self.messages.iter().position(predicate)
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// A procedure analyzer walks the messages of its category in capture order,
/// attaching findings to them and recording what it learns in the shared
/// [UeContext].
pub trait ProcedureAnalyzer {
    /// Returns a user-friendly, concise name for your analyzer.
    fn get_name(&self) -> Cow<'_, str>;

    /// Returns a user-friendly description of what your analyzer does.
    fn get_description(&self) -> Cow<'_, str>;

    /// Bumped whenever the rules change in a way that alters findings.
    fn get_version(&self) -> u32;

    /// The category whose messages are handed to [ProcedureAnalyzer::analyze].
    fn category(&self) -> Category;

    /// `selection` holds the trace indices of the messages in
    /// [ProcedureAnalyzer::category], in capture order and never empty.
    fn analyze(&mut self, trace: &mut Trace, selection: &[usize], ctx: &mut UeContext);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerMetadata {
    pub name: String,
    pub description: String,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analyzers: Vec<AnalyzerMetadata>,
    /// Every category seen in the capture, in order of first appearance
    pub categories: Vec<Category>,
    pub messages: Vec<Message>,
    pub ue: UeContext,
}

impl AnalysisReport {
    pub fn total_severity(&self) -> u32 {
        self.messages.iter().map(Message::severity).sum()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.messages
            .iter()
            .flat_map(|msg| msg.findings())
            .map(|finding| finding.severity())
            .max()
    }

    /// Messages that picked up at least one finding.
    pub fn flagged(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|msg| !msg.findings().is_empty())
    }
}

/// Runs the procedure analyzers over a capture in their fixed order:
/// identity, authentication, security mode command, attach. Later analyzers
/// rely on landmarks and algorithm choices recorded by earlier ones.
pub struct Harness {
    analyzers: Vec<Box<dyn ProcedureAnalyzer + Send>>,
    sim_profile: Option<SimProfile>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            analyzers: Vec::new(),
            sim_profile: None,
        }
    }

    pub fn new_with_config(analyzer_config: &AnalyzerConfig) -> Self {
        let mut harness = Harness::new();

        if analyzer_config.identity {
            harness.add_analyzer(Box::new(IdentityAnalyzer::new()));
        }
        if analyzer_config.authentication {
            harness.add_analyzer(Box::new(AuthenticationAnalyzer::new()));
        }
        if analyzer_config.security_mode {
            harness.add_analyzer(Box::new(SecurityModeAnalyzer::new()));
        }
        if analyzer_config.attach {
            harness.add_analyzer(Box::new(AttachAnalyzer::new()));
        }

        harness
    }

    pub fn with_sim_profile(mut self, profile: Option<SimProfile>) -> Self {
        self.sim_profile = profile;
        self
    }

    pub fn add_analyzer(&mut self, analyzer: Box<dyn ProcedureAnalyzer + Send>) {
        self.analyzers.push(analyzer);
    }

    pub fn get_names(&self) -> Vec<Cow<'_, str>> {
        self.analyzers.iter().map(|a| a.get_name()).collect()
    }

    pub fn get_metadata(&self) -> Vec<AnalyzerMetadata> {
        self.analyzers
            .iter()
            .map(|analyzer| AnalyzerMetadata {
                name: analyzer.get_name().to_string(),
                description: analyzer.get_description().to_string(),
                version: analyzer.get_version(),
            })
            .collect()
    }

    /// Analyses one complete capture. Each call starts from a fresh
    /// [UeContext], so running the same capture twice gives the same report.
    pub fn analyze(&mut self, messages: Vec<Message>) -> Result<AnalysisReport, AnalysisError> {
        let mut trace = Trace::new(messages);
        trace.classify();

        let mut ctx = UeContext::new(self.sim_profile.clone());
        ctx.initialize(&trace)?;

        // partitions are fixed before any analyzer adds the Analysed tag
        let mut partitions: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
        for analyzer in &self.analyzers {
            let category = analyzer.category();
            partitions
                .entry(category)
                .or_insert_with(|| trace.indices(category));
        }

        for analyzer in &mut self.analyzers {
            let selection = &partitions[&analyzer.category()];
            if selection.is_empty() {
                debug!("{}: no {} messages, skipping", analyzer.get_name(), analyzer.category());
                continue;
            }
            debug!("{}: {} messages", analyzer.get_name(), selection.len());
            analyzer.analyze(&mut trace, selection, &mut ctx);
        }

        let mut categories: Vec<Category> = Vec::new();
        for msg in trace.messages() {
            for category in msg.categories().iter() {
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }

        let report = AnalysisReport {
            analyzers: self.get_metadata(),
            categories,
            messages: trace.into_messages(),
            ue: ctx,
        };
        info!(
            "analysed {} messages: {} flagged, total severity {}",
            report.messages.len(),
            report.flagged().count(),
            report.total_severity()
        );
        Ok(report)
    }
}
