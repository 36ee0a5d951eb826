pub mod json;
pub mod xml;

pub use json::JsonMarshaller;
pub use xml::XmlMarshaller;

/// Wire forms the gateway can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Xml,
}

/// Pick the wire form for an `Accept`/`Content-Type` value. JSON is the
/// default when the header is absent or names neither form.
pub fn negotiate(media_type: Option<&str>) -> WireFormat {
    match media_type {
        Some(value) => {
            let value = value.to_lowercase();
            if value.contains("application/xml") || value.contains("text/xml") {
                WireFormat::Xml
            } else {
                WireFormat::Json
            }
        }
        None => WireFormat::Json,
    }
}
