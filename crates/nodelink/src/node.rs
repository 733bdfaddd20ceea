use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::DefaultHashBuilder;

use indexmap::map::IndexMap;

use serde::{Deserialize, Serialize};

/// Time service type.
pub const TIME_SERVICE: &str = "esp.service.time";
/// Timezone parameter type of the time service.
pub const TIMEZONE_PARAM: &str = "esp.param.tz";

/// Thread border router service type.
pub const THREAD_BORDER_ROUTER_SERVICE: &str = "esp.service.thread-br";
/// Active dataset parameter type of the border router service.
pub const ACTIVE_DATASET_PARAM: &str = "esp.param.tbr-active-dataset";
/// Pending dataset parameter type of the border router service.
pub const PENDING_DATASET_PARAM: &str = "esp.param.tbr-pending-dataset";
/// Command parameter type of the border router service.
pub const THREAD_COMMAND_PARAM: &str = "esp.param.tbr-cmd";
/// Border agent identifier parameter type of the border router service.
pub const BORDER_AGENT_ID_PARAM: &str = "esp.param.tbr-border-agent-id";

/// Matter controller service type.
pub const MATTER_CONTROLLER_SERVICE: &str = "esp.service.matter-controller";
/// Cloud base URL parameter type of the Matter controller service.
pub const BASE_URL_PARAM: &str = "esp.param.base-url";
/// User token parameter type of the Matter controller service.
pub const USER_TOKEN_PARAM: &str = "esp.param.user-token";
/// Group identifier parameter type of the Matter controller service.
pub const GROUP_ID_PARAM: &str = "esp.param.rmaker-group-id";
/// Command parameter type of the Matter controller service.
pub const MATTER_COMMAND_PARAM: &str = "esp.param.matter-ctl-cmd";
/// Status parameter type of the Matter controller service.
pub const MATTER_STATUS_PARAM: &str = "esp.param.matter-ctl-status";
/// Matter node identifier parameter type of the Matter controller service.
pub const MATTER_NODE_ID_PARAM: &str = "esp.param.matter-node-id";

/// The value of a node parameter.
///
/// Binary values travel as hex strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Text(String),
    /// Any other JSON value.
    Other(serde_json::Value),
}

impl ParamValue {
    /// Returns the string value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer value, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

/// A parameter of a node service.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    kind: String,
    value: Option<ParamValue>,
}

impl Param {
    /// Creates a [`Param`] without a value.
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value: None,
        }
    }

    /// Sets the parameter value.
    #[must_use]
    #[inline]
    pub fn value(mut self, value: impl Into<ParamValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the parameter value, if reported.
    #[must_use]
    pub const fn get(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    /// Returns the string value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(ParamValue::as_str)
    }

    /// Whether the parameter has no value or an empty string value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.value {
            None | Some(ParamValue::Other(serde_json::Value::Null)) => true,
            Some(ParamValue::Text(text)) => text.is_empty(),
            Some(_) => false,
        }
    }
}

/// A service of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    name: String,
    kind: String,
    params: IndexMap<String, Param, DefaultHashBuilder>,
}

impl Service {
    /// Creates a [`Service`] without parameters.
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: IndexMap::with_hasher(DefaultHashBuilder::default()),
        }
    }

    /// Adds a parameter.
    #[must_use]
    #[inline]
    pub fn param(mut self, param: Param) -> Self {
        let _ = self.params.insert(param.name.clone(), param);
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the service type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the parameters, in the order reported by the cloud.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn param_by_name(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }

    /// Returns the first parameter of the given type.
    #[must_use]
    pub fn param_by_type(&self, kind: &str) -> Option<&Param> {
        self.params.values().find(|param| param.kind == kind)
    }
}

/// A parameter update sent to a node, grouped by service name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamsUpdate(
    IndexMap<String, IndexMap<String, ParamValue, DefaultHashBuilder>, DefaultHashBuilder>,
);

impl ParamsUpdate {
    /// Creates an empty [`ParamsUpdate`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self(IndexMap::with_hasher(DefaultHashBuilder::default()))
    }

    /// Sets a parameter of a service.
    #[must_use]
    pub fn set(
        mut self,
        service: impl Into<String>,
        param: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        let _ = self
            .0
            .entry(service.into())
            .or_insert_with(|| IndexMap::with_hasher(DefaultHashBuilder::default()))
            .insert(param.into(), value.into());
        self
    }

    /// Whether the update contains no parameter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(IndexMap::is_empty)
    }

    /// Returns the updated parameters as `(service, param, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ParamValue)> {
        self.0.iter().flat_map(|(service, params)| {
            params
                .iter()
                .map(move |(param, value)| (service.as_str(), param.as_str(), value))
        })
    }
}

#[derive(Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Deserialize)]
struct RawService {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    params: Vec<RawParam>,
}

#[derive(Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    services: Vec<RawService>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(default)]
    config: RawConfig,
    #[serde(default)]
    params: IndexMap<String, IndexMap<String, ParamValue, DefaultHashBuilder>, DefaultHashBuilder>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        let mut node = Node::new(raw.id);
        for raw_service in raw.config.services {
            let values = raw.params.get(&raw_service.name);
            let mut service = Service::new(raw_service.name.clone(), raw_service.kind);
            for raw_param in raw_service.params {
                let mut param = Param::new(raw_param.name, raw_param.kind);
                param.value = values.and_then(|values| values.get(&param.name)).cloned();
                service = service.param(param);
            }
            node = node.service(service);
        }
        node
    }
}

/// A node as reported by the cloud.
///
/// A node is deserialized from an element of the `node_details` list, made
/// of the node configuration (services and parameter types) and of the
/// current parameter values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawNode")]
pub struct Node {
    id: String,
    services: IndexMap<String, Service, DefaultHashBuilder>,
}

impl Node {
    /// Creates a [`Node`] without services.
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            services: IndexMap::with_hasher(DefaultHashBuilder::default()),
        }
    }

    /// Adds a service.
    #[must_use]
    #[inline]
    pub fn service(mut self, service: Service) -> Self {
        let _ = self.services.insert(service.name.clone(), service);
        self
    }

    /// Returns the node identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the services, in the order reported by the cloud.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Returns the first service of the given type.
    #[must_use]
    pub fn service_by_type(&self, kind: &str) -> Option<&Service> {
        self.services.values().find(|service| service.kind == kind)
    }

    /// Returns the service of the given type together with its first
    /// parameter of the given type.
    #[must_use]
    pub fn service_param(
        &self,
        service_kind: &str,
        param_kind: &str,
    ) -> Option<(&Service, &Param)> {
        let service = self.service_by_type(service_kind)?;
        Some((service, service.param_by_type(param_kind)?))
    }

    /// Applies a confirmed parameter update.
    ///
    /// Parameters that are not part of the node configuration are ignored.
    pub fn apply_update(&mut self, update: &ParamsUpdate) {
        for (service, param, value) in update.iter() {
            if let Some(param) = self
                .services
                .get_mut(service)
                .and_then(|service| service.params.get_mut(param))
            {
                param.value = Some(value.clone());
            }
        }
    }

    /// Returns the update writing `timezone` to the time service, when the
    /// node has a time service whose timezone is still empty.
    #[must_use]
    pub fn timezone_update(&self, timezone: &str) -> Option<ParamsUpdate> {
        let (service, param) = self.service_param(TIME_SERVICE, TIMEZONE_PARAM)?;
        param
            .is_empty()
            .then(|| ParamsUpdate::new().set(service.name(), param.name(), timezone))
    }
}
