use lodge_core::{ComponentHandle, ComponentToken, Descriptor, RetainedObject, StateBlob, TargetInfo};

/// Release number reported by the platform's version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion(pub u32);

impl RuntimeVersion {
    /// First release whose lifecycle entry points take a client record
    /// instead of the raw token.
    pub const CLIENT_ADDRESSED: RuntimeVersion = RuntimeVersion(31);

    pub fn is_client_addressed(&self) -> bool {
        *self >= Self::CLIENT_ADDRESSED
    }
}

impl std::fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Platform-side record for a token, required by client-addressed entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientRef(pub u64);

/// Opaque saved calling identity, handed back to restore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallingIdentity(pub u64);

/// Everything the platform needs to materialize a component.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub token: ComponentToken,
    pub id: String,
    pub target: TargetInfo,
    pub descriptor: Descriptor,
    pub saved_state: Option<StateBlob>,
    pub retained: Option<RetainedObject>,
}

/// Follow-up actions for the first start after a launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingStart {
    pub old_state: Option<StateBlob>,
    pub restore_state: bool,
    pub call_post_create: bool,
}

impl PendingStart {
    /// Start that restores `old_state` and runs the post-create callback.
    pub fn restoring(old_state: Option<StateBlob>) -> Self {
        Self {
            old_state,
            restore_state: true,
            call_post_create: true,
        }
    }
}

/// Shape of a single parameter or return value of an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Unit,
    Bool,
    Int,
    Text,
    Token,
    Client,
    Descriptors,
    Launch,
    PendingStart,
    Blob,
    Handle,
    Retained,
}

/// A dynamically-shaped argument or return value.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Text(String),
    Token(ComponentToken),
    Client(ClientRef),
    Descriptors(Vec<Descriptor>),
    Launch(Box<LaunchSpec>),
    PendingStart(Option<PendingStart>),
    Blob(Option<StateBlob>),
    Handle(Option<ComponentHandle>),
    Retained(Option<RetainedObject>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unit => ValueKind::Unit,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
            Value::Token(_) => ValueKind::Token,
            Value::Client(_) => ValueKind::Client,
            Value::Descriptors(_) => ValueKind::Descriptors,
            Value::Launch(_) => ValueKind::Launch,
            Value::PendingStart(_) => ValueKind::PendingStart,
            Value::Blob(_) => ValueKind::Blob,
            Value::Handle(_) => ValueKind::Handle,
            Value::Retained(_) => ValueKind::Retained,
        }
    }
}

/// A looked-up entry point: its name and the exact parameter shape it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub params: Vec<ValueKind>,
}

/// Why the platform refused an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeFault {
    /// The entry point ran and rejected the call.
    Rejected(String),
    /// The arguments did not match the entry point's shape.
    BadArguments(String),
}

/// The external platform runtime that actually hosts component instances.
///
/// Its entry points are private and their shapes differ between releases,
/// so they are reached by name and shape rather than through a typed API.
/// Implementations must be callable from any thread; the manager itself
/// only ever calls from the host's lifecycle thread.
pub trait PlatformRuntime: Send + Sync {
    /// Read-only version probe.
    fn version(&self) -> RuntimeVersion;

    /// Look up an entry point by name and parameter shape.
    fn entry_point(&self, name: &str, params: &[ValueKind]) -> Option<EntryPoint>;

    /// Invoke a previously looked-up entry point.
    fn invoke(&self, entry: &EntryPoint, args: Vec<Value>) -> Result<Value, InvokeFault>;

    /// Drop the ambient calling identity, returning what to restore later.
    fn clear_calling_identity(&self) -> CallingIdentity;

    fn restore_calling_identity(&self, identity: CallingIdentity);
}
