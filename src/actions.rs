//! Client-side actions the assistant may request
//!
//! The registry is closed: every supported function name maps to a typed
//! argument schema and a handler. Anything else is answered with
//! [`UNSUPPORTED_OUTPUT`] without touching the display.

mod color;

pub use color::Rgb;

use crate::assistants::{ToolCallRequest, ToolOutput};
use serde_json::Value;

/// Display property holding the background color
pub const BACKGROUND_PROPERTY: &str = "--base-background-color-rgb";
/// Display property holding the foreground color
pub const FOREGROUND_PROPERTY: &str = "--base-foreground-color-rgb";

pub const UNSUPPORTED_OUTPUT: &str = "Action not supported";
pub const INVALID_ARGUMENTS_OUTPUT: &str = "invalid arguments";

/// Whatever renders the conversation; receives action side effects
pub trait DisplaySurface: Send + Sync {
    /// Set a named display property. Applied synchronously.
    fn set_property(&self, name: &str, value: &str);
}

/// Supported action names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SetBackgroundColor,
    SetForegroundColor,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [
        ActionKind::SetBackgroundColor,
        ActionKind::SetForegroundColor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::SetBackgroundColor => "set_background_color",
            ActionKind::SetForegroundColor => "set_foreground_color",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            ActionKind::SetBackgroundColor => "Set the background color of the chat display.",
            ActionKind::SetForegroundColor => "Set the text color of the chat display.",
        }
    }

    fn parse(self, arguments: &str) -> Result<Action, serde_json::Error> {
        let rgb: Rgb = serde_json::from_str(arguments)?;
        Ok(match self {
            ActionKind::SetBackgroundColor => Action::SetBackgroundColor(rgb),
            ActionKind::SetForegroundColor => Action::SetForegroundColor(rgb),
        })
    }
}

/// Function definition to register on the assistant
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// An action with validated arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetBackgroundColor(Rgb),
    SetForegroundColor(Rgb),
}

impl Action {
    /// Apply the side effect and return the confirmation reported to the assistant
    pub fn apply(&self, display: &dyn DisplaySurface) -> &'static str {
        match self {
            Action::SetBackgroundColor(rgb) => {
                tracing::info!(%rgb, "Setting background color");
                display.set_property(BACKGROUND_PROPERTY, &rgb.to_string());
                "I've set the background color"
            }
            Action::SetForegroundColor(rgb) => {
                tracing::info!(%rgb, "Setting foreground color");
                display.set_property(FOREGROUND_PROPERTY, &rgb.to_string());
                "I've set the foreground color"
            }
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Action::SetBackgroundColor(_) => "Setting background...",
            Action::SetForegroundColor(_) => "Setting foreground...",
        }
    }
}

/// How one requested call resolves against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Action(Action),
    InvalidArguments { name: String, error: String },
    Unsupported { name: String },
}

/// Outputs for one `requires_action` batch plus the status lines it produced
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outputs: Vec<ToolOutput>,
    pub statuses: Vec<String>,
}

/// Set of actions enabled for a session
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    kinds: Vec<ActionKind>,
}

impl ActionRegistry {
    /// Background and foreground color actions
    pub fn colors() -> Self {
        Self {
            kinds: ActionKind::ALL.to_vec(),
        }
    }

    /// No actions; every call is unsupported
    pub fn empty() -> Self {
        Self { kinds: Vec::new() }
    }

    pub fn definitions(&self) -> Vec<ActionDefinition> {
        self.kinds
            .iter()
            .map(|kind| ActionDefinition {
                name: kind.name(),
                description: kind.description(),
                parameters: Rgb::schema(),
            })
            .collect()
    }

    pub fn resolve(&self, call: &ToolCallRequest) -> Resolved {
        let name = call.function.name.as_str();
        let Some(kind) = ActionKind::from_name(name).filter(|k| self.kinds.contains(k)) else {
            return Resolved::Unsupported {
                name: name.to_string(),
            };
        };

        match kind.parse(&call.function.arguments) {
            Ok(action) => Resolved::Action(action),
            Err(e) => Resolved::InvalidArguments {
                name: name.to_string(),
                error: e.to_string(),
            },
        }
    }

    /// Answer every call of a batch, in request order.
    ///
    /// One output per call, keyed by the call id. A bad call never aborts
    /// the rest of the batch.
    pub fn dispatch_batch(
        &self,
        calls: &[ToolCallRequest],
        display: &dyn DisplaySurface,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for call in calls {
            let output = match self.resolve(call) {
                Resolved::Action(action) => {
                    report.statuses.push(action.status().to_string());
                    action.apply(display)
                }
                Resolved::InvalidArguments { name, error } => {
                    tracing::warn!(
                        tool_call_id = %call.id,
                        name = %name,
                        error = %error,
                        "Invalid action arguments"
                    );
                    report.statuses.push(format!("Invalid arguments for {name}..."));
                    INVALID_ARGUMENTS_OUTPUT
                }
                Resolved::Unsupported { name } => {
                    tracing::warn!(
                        tool_call_id = %call.id,
                        name = %name,
                        "Unsupported action requested"
                    );
                    report.statuses.push(format!("Action {name} not supported..."));
                    UNSUPPORTED_OUTPUT
                }
            };
            report.outputs.push(ToolOutput::new(call.id.clone(), output));
        }

        report
    }
}
