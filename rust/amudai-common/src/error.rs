use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn unknown_sort_field(field: impl Into<String>) -> Error {
        Error(
            ErrorKind::UnknownSortField {
                field: field.into(),
            }
            .into(),
        )
    }

    pub fn non_sortable_field(field: impl Into<String>, field_type: impl Into<String>) -> Error {
        Error(
            ErrorKind::NonSortableField {
                field: field.into(),
                field_type: field_type.into(),
            }
            .into(),
        )
    }

    pub fn sort_region_mismatch(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::SortRegionMismatch {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn serialization<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Serialization {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("sort field '{field}' is not defined in the attribute schema")]
    UnknownSortField { field: String },

    #[error("field '{field}' of type {field_type} cannot be used as a sort field")]
    NonSortableField { field: String, field_type: String },

    #[error("sort key region mismatch: {message}")]
    SortRegionMismatch { message: String },

    #[error("serialization error for '{context}': {source}")]
    Serialization {
        context: String,
        source: StdErrorBoxed,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        source: Option<StdErrorBoxed>,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::serialization("bincode encode", e)
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::serialization("bincode decode", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        ErrorKind::InvalidConfig {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
        .into()
    }
}
