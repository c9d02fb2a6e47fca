use thiserror::Error;

pub type TaResult<T> = Result<T, TaError>;

#[derive(Debug, Error)]
pub enum TaError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Syntax errors produced by the expression lexer and parser.
///
/// Columns are 1-based, counted in characters of the single-line input.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Syntax error at column {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Static validation errors raised before any execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeCheckError {
    #[error("Unknown indicator: '{name}'")]
    UnknownIndicator { name: String },

    #[error("Unknown field '{field}' for source '{source_name}'")]
    UnknownField { source_name: String, field: String },

    #[error("[{indicator}] Unknown parameter: '{name}'")]
    UnknownParameter { indicator: String, name: String },

    #[error("[{indicator}] Too many positional arguments: expected at most {expected}, got {actual}")]
    TooManyArguments {
        indicator: String,
        expected: usize,
        actual: usize,
    },

    #[error("[{indicator}] Missing required parameter: '{name}'")]
    MissingRequiredParameter { indicator: String, name: String },

    #[error("[{indicator}] Parameter '{name}' specified both positionally and as keyword")]
    DuplicateParameter { indicator: String, name: String },

    #[error("[{node_kind}] expected {expected}, got {actual}")]
    Mismatch {
        node_kind: &'static str,
        parameter: Option<String>,
        expected: String,
        actual: String,
    },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Errors related to series construction, alignment and dataset access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("Timestamps and values must have the same length ({timestamps} vs {values})")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("Availability mask length {mask} does not match series length {len}")]
    MaskLengthMismatch { mask: usize, len: usize },

    #[error("Timestamps must be strictly increasing")]
    UnsortedTimestamps,

    #[error("Mismatched {axis} between operands")]
    MetadataMismatch { axis: MetadataAxis },

    #[error("Series axes cannot be aligned")]
    AlignmentMismatch,

    #[error("Missing required field: '{field}'")]
    MissingRequiredField { field: String },

    #[error("No partition for symbol={symbol} timeframe={timeframe} source={source_name}")]
    PartitionMissing {
        symbol: String,
        timeframe: String,
        source_name: String,
    },

    #[error("Invalid timeframe string: '{0}'")]
    InvalidTimeframe(String),

    #[error("Invalid time range (start {start} > end {end})")]
    InvalidTimeRange { start: i64, end: i64 },
}

/// The axis on which two series disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataAxis {
    Symbol,
    Timeframe,
}

impl std::fmt::Display for MetadataAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataAxis::Symbol => write!(f, "symbol"),
            MetadataAxis::Timeframe => write!(f, "timeframe"),
        }
    }
}

/// Errors raised while compiling or executing a plan.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Expression references multiple sources ({sources}); partition selection is ambiguous")]
    AmbiguousPartition { sources: String },

    #[error("Indicator '{indicator}' has no output named '{member}'")]
    UnknownMember { indicator: String, member: String },

    #[error("Output index {index} out of bounds for indicator '{indicator}'")]
    OutputIndexOutOfBounds { indicator: String, index: usize },

    #[error("Plan node {node} cannot be executed in streaming mode: {reason}")]
    UnsupportedStreamingNode { node: u32, reason: String },

    #[error("Failed to encode plan")]
    PlanEncoding(#[from] postcard::Error),

    #[error("Registry rejected registration of '{name}': {reason}")]
    InvalidRegistration { name: String, reason: String },

    #[error("Internal invariant violation: {0}")]
    InvariantViolation(String),
}
