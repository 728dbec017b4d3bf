//! Serializer registry for the legacy protocol.
//!
//! Legacy servers name a serializer per component (or imply one from the
//! component type). Names are resolved once at endpoint construction;
//! an unrecognized name fails fast and degrades that endpoint to
//! invalid without aborting session construction.

use crate::error::{ClientError, ClientResult};
use crate::types::ComponentConfig;
use crate::utils::SKIP_COMPONENTS;

/// How a legacy component's value crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerKind {
    /// Value passes through untouched (also used for skip components).
    Simple,
    /// String value.
    Str,
    /// Numeric value.
    Number,
    /// Boolean value.
    Boolean,
    /// Arbitrary JSON structure.
    Json,
    /// Base64- or reference-valued image.
    Image,
    /// Video file reference.
    Video,
    /// Generic file reference.
    File,
    /// List of file references.
    Gallery,
}

impl SerializerKind {
    /// Resolve an explicit serializer name from the registry.
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "SimpleSerializable" => Some(Self::Simple),
            "StringSerializable" => Some(Self::Str),
            "NumberSerializable" => Some(Self::Number),
            "BooleanSerializable" => Some(Self::Boolean),
            "JSONSerializable" => Some(Self::Json),
            "ImgSerializable" => Some(Self::Image),
            "VideoSerializable" => Some(Self::Video),
            "FileSerializable" => Some(Self::File),
            "GallerySerializable" => Some(Self::Gallery),
            _ => None,
        }
    }

    /// Serializer implied by a component type, for components without an
    /// explicit `serializer` field.
    pub fn for_component(kind: &str) -> Option<Self> {
        match kind {
            "textbox" | "radio" | "dropdown" | "button" | "label" | "markdown" | "html"
            | "code" | "colorpicker" => Some(Self::Str),
            "number" | "slider" => Some(Self::Number),
            "checkbox" => Some(Self::Boolean),
            "json" | "dataframe" | "checkboxgroup" | "highlightedtext" | "chatbot"
            | "plot" => Some(Self::Json),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" | "file" | "uploadbutton" | "model3d" => Some(Self::File),
            "gallery" => Some(Self::Gallery),
            "state" => Some(Self::Simple),
            _ => None,
        }
    }

    /// Whether deserialized values of this kind are file references that
    /// need materializing locally.
    pub fn handles_files(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::File | Self::Gallery
        )
    }
}

/// Resolve the serializer for one legacy component.
///
/// Explicit `serializer` names win; otherwise the component type implies
/// one. Skip components deserialize as `Simple` on the output side.
pub fn resolve_serializer(
    component: &ComponentConfig,
    output_side: bool,
) -> ClientResult<SerializerKind> {
    if let Some(name) = &component.serializer {
        return SerializerKind::resolve(name).ok_or_else(|| {
            ClientError::UnknownSerializer(format!(
                "{name} (component {}); a newer client may be required",
                component.id
            ))
        });
    }
    if output_side && SKIP_COMPONENTS.contains(&component.kind.as_str()) {
        return Ok(SerializerKind::Simple);
    }
    SerializerKind::for_component(&component.kind).ok_or_else(|| {
        ClientError::UnknownComponent(format!(
            "{} (component {}); a newer client may be required",
            component.kind, component.id
        ))
    })
}
