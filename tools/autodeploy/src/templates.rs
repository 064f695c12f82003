//! Template store
//!
//! Holds the five JSON blueprints (channel, device, tag, agent, agent item).
//! Templates are never sent and never mutated: every payload is produced by
//! [`Template::hydrate`], which builds a fresh object from the blueprint plus
//! per-entity overrides.

use std::fmt;
use std::fs;
use std::path::Path;

use errors::{DeployError, DeployResult};
use serde_json::{Map, Value};
use tracing::debug;

/// Resource name property shared by every Kepware object
pub const FIELD_NAME: &str = "common.ALLTYPES_NAME";
/// Device connection address (`<ip>.<sub-index>`)
pub const FIELD_DEVICE_ID: &str = "servermain.DEVICE_ID_STRING";
pub const FIELD_TAG_ADDRESS: &str = "servermain.TAG_ADDRESS";
pub const FIELD_TAG_DATA_TYPE: &str = "servermain.TAG_DATA_TYPE";
/// Fully qualified server tag referenced by an IoT item
pub const FIELD_IOT_ITEM_SERVER_TAG: &str = "iot_gateway.IOT_ITEM_SERVER_TAG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Channel,
    Device,
    Tag,
    Agent,
    AgentItem,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::Channel,
        TemplateKind::Device,
        TemplateKind::Tag,
        TemplateKind::Agent,
        TemplateKind::AgentItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Device => "device",
            Self::Tag => "tag",
            Self::Agent => "agent",
            Self::AgentItem => "agent_item",
        }
    }

    /// File name inside the templates directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Channel => "channel.json",
            Self::Device => "device.json",
            Self::Tag => "tag.json",
            Self::Agent => "agent.json",
            Self::AgentItem => "agent_item.json",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable resource blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    kind: TemplateKind,
    fields: Map<String, Value>,
}

impl Template {
    pub fn new(kind: TemplateKind, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    /// Build a template from a JSON value; anything but an object is rejected
    pub fn from_value(kind: TemplateKind, value: Value, origin: &str) -> DeployResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(kind, fields)),
            other => Err(DeployError::TemplateLoad {
                template: kind.to_string(),
                path: origin.to_string(),
                reason: format!("expected a JSON object, found {}", json_type(&other)),
            }),
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The blueprint as a standalone payload
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Produce an independent payload: the blueprint with `overrides` applied
    pub fn hydrate<I, K>(&self, overrides: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut payload = self.fields.clone();
        for (field, value) in overrides {
            payload.insert(field.into(), value);
        }
        Value::Object(payload)
    }
}

/// The five templates a deployment needs
#[derive(Debug, Clone)]
pub struct TemplateStore {
    channel: Template,
    device: Template,
    tag: Template,
    agent: Template,
    agent_item: Template,
}

impl TemplateStore {
    /// Load all five templates from `dir`; any missing or malformed file is fatal
    pub fn load(dir: &Path) -> DeployResult<Self> {
        let load = |kind: TemplateKind| load_template(dir, kind);
        let store = Self {
            channel: load(TemplateKind::Channel)?,
            device: load(TemplateKind::Device)?,
            tag: load(TemplateKind::Tag)?,
            agent: load(TemplateKind::Agent)?,
            agent_item: load(TemplateKind::AgentItem)?,
        };
        store.channel_name()?;
        Ok(store)
    }

    /// Build a store from in-memory JSON values
    pub fn from_values(
        channel: Value,
        device: Value,
        tag: Value,
        agent: Value,
        agent_item: Value,
    ) -> DeployResult<Self> {
        let store = Self {
            channel: Template::from_value(TemplateKind::Channel, channel, "<memory>")?,
            device: Template::from_value(TemplateKind::Device, device, "<memory>")?,
            tag: Template::from_value(TemplateKind::Tag, tag, "<memory>")?,
            agent: Template::from_value(TemplateKind::Agent, agent, "<memory>")?,
            agent_item: Template::from_value(TemplateKind::AgentItem, agent_item, "<memory>")?,
        };
        store.channel_name()?;
        Ok(store)
    }

    pub fn get(&self, kind: TemplateKind) -> &Template {
        match kind {
            TemplateKind::Channel => &self.channel,
            TemplateKind::Device => &self.device,
            TemplateKind::Tag => &self.tag,
            TemplateKind::Agent => &self.agent,
            TemplateKind::AgentItem => &self.agent_item,
        }
    }

    pub fn channel(&self) -> &Template {
        &self.channel
    }

    pub fn device(&self) -> &Template {
        &self.device
    }

    pub fn tag(&self) -> &Template {
        &self.tag
    }

    pub fn agent(&self) -> &Template {
        &self.agent
    }

    pub fn agent_item(&self) -> &Template {
        &self.agent_item
    }

    /// Channel name declared by the channel template
    pub fn channel_name(&self) -> DeployResult<String> {
        match self.channel.get(FIELD_NAME) {
            Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.clone()),
            _ => Err(DeployError::TemplateLoad {
                template: TemplateKind::Channel.to_string(),
                path: TemplateKind::Channel.file_name().to_string(),
                reason: format!("'{}' must be a non-empty string", FIELD_NAME),
            }),
        }
    }
}

fn load_template(dir: &Path, kind: TemplateKind) -> DeployResult<Template> {
    let path = dir.join(kind.file_name());
    let origin = path.display().to_string();
    let load_error = |reason: String| DeployError::TemplateLoad {
        template: kind.to_string(),
        path: origin.clone(),
        reason,
    };

    let content = fs::read_to_string(&path).map_err(|e| load_error(e.to_string()))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?;
    let template = Template::from_value(kind, value, &origin)?;

    debug!("Loaded {} template ({} fields)", kind, template.fields().len());
    Ok(template)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
