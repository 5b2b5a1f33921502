use crate::errors::ServiceError;
use crate::services::command_policy;
use serde::Serialize;
use std::fmt;

/// Device-side output filters appended after `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeOperator {
    Include,
    Exclude,
    Begin,
    Section,
}

impl PipeOperator {
    pub const ALL: [PipeOperator; 4] = [
        PipeOperator::Include,
        PipeOperator::Exclude,
        PipeOperator::Begin,
        PipeOperator::Section,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipeOperator::Include => "include",
            PipeOperator::Exclude => "exclude",
            PipeOperator::Begin => "begin",
            PipeOperator::Section => "section",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PipeOperator::Include => "Show only lines containing the pattern",
            PipeOperator::Exclude => "Show lines NOT containing the pattern",
            PipeOperator::Begin => "Show output starting from the pattern",
            PipeOperator::Section => "Show the section containing the pattern",
        }
    }

    pub fn from_name(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        PipeOperator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
    }
}

impl fmt::Display for PipeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeFilter {
    pub operator: PipeOperator,
    pub value: String,
}

/// A validated read-only command. Only constructible through the command
/// policy, so holding one means the text is safe to send to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowCommand {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipe: Option<PipeFilter>,
}

impl ShowCommand {
    pub fn new(
        command: &str,
        pipe_operator: Option<PipeOperator>,
        pipe_value: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let command = command_policy::validate_command(command)?;
        let pipe = command_policy::validate_pipe(pipe_operator, pipe_value)?;
        Ok(Self { command, pipe })
    }

    /// The command without any pipe filter, as used for output parsing.
    pub fn base_command(&self) -> &str {
        &self.command
    }

    pub fn pipe(&self) -> Option<&PipeFilter> {
        self.pipe.as_ref()
    }

    pub fn full_command(&self) -> String {
        match &self.pipe {
            Some(pipe) => format!("{} | {} {}", self.command, pipe.operator, pipe.value),
            None => self.command.clone(),
        }
    }
}
