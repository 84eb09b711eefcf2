//! Namespace URIs used throughout the engine.

/// XML Schema namespace (built-in atomic types).
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";

/// W3C error namespace (`err:` prefix) for XPath/XSLT error codes.
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// Reserved `xml` prefix namespace.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace for engine-specific error codes that have no W3C counterpart.
pub const QUIRE_ERR_NS: &str = "urn:quire:errors";
