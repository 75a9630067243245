//! Converts leaf text to serde_json::Value, guided by the XSD simple type.

use crate::error::DecodeError;
use serde_json::Value;

/// The json-relevant shape of an XSD simple type.
#[derive(Debug,Clone,PartialEq,Eq)]
pub enum SimpleKind {
  /// string, and everything with no better json representation (dates, uris, ...)
  String,
  /// whitespace-collapsed strings: token, NMTOKEN, language, ...
  Token,
  Integer,
  /// decimal, float, double. Written as json numbers, like the python converter's decimal_default.
  Decimal,
  Boolean,
  /// whitespace separated items
  List(Box<SimpleKind>),
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Validation {
  /// invalid content fails the element
  Strict,
  /// invalid content is passed through as a string
  Skip,
}

impl SimpleKind {
  /// Mapping for the builtin types in the XMLSchema namespace, by local name.
  pub fn builtin(name : &str) -> Option<Self> {
    use SimpleKind::*;
    let kind = match name {
      "string" | "anySimpleType" | "normalizedString" => String,
      "token" | "NMTOKEN" | "Name" | "NCName" | "language" | "ID" | "IDREF" | "ENTITY" | "QName" | "NOTATION" | "anyURI" => Token,
      "date" | "dateTime" | "time" | "duration" | "gYear" | "gYearMonth" | "gMonth" | "gMonthDay" | "gDay" | "base64Binary" | "hexBinary" | "dateTimeStamp" => Token,
      "integer" | "int" | "long" | "short" | "byte"
        | "nonNegativeInteger" | "positiveInteger" | "nonPositiveInteger" | "negativeInteger"
        | "unsignedLong" | "unsignedInt" | "unsignedShort" | "unsignedByte" => Integer,
      "decimal" | "float" | "double" => Decimal,
      "boolean" => Boolean,
      "NMTOKENS" | "IDREFS" | "ENTITIES" => List(Box::new(Token)),
      _ => return None,
    };
    Some(kind)
  }

  fn name(&self) -> &'static str {
    match self {
      SimpleKind::String => "string",
      SimpleKind::Token => "token",
      SimpleKind::Integer => "integer",
      SimpleKind::Decimal => "decimal",
      SimpleKind::Boolean => "boolean",
      SimpleKind::List(_) => "list",
    }
  }
}

/// Convert the text of `element` (or of one of its attributes) as `kind`.
pub fn leaf_value(element : &str, text : &str, kind : &SimpleKind, validation : Validation) -> Result<Value, DecodeError> {
  let invalid = || DecodeError::InvalidValue{ element: element.into(), kind: kind.name(), text: text.into() };
  // the lax fallback for a value that does not parse as its kind
  let fallback = || match validation {
    Validation::Strict => Err(invalid()),
    Validation::Skip => Ok(Value::String(text.to_string())),
  };

  match kind {
    SimpleKind::String => Ok(Value::String(text.to_string())),
    SimpleKind::Token => Ok(Value::String(text.split_whitespace().collect::<Vec<_>>().join(" "))),

    SimpleKind::Integer => {
      let trimmed = text.trim().trim_start_matches('+');
      if let Ok(n) = trimmed.parse::<i64>() { return Ok(Value::from(n)) }
      if let Ok(n) = trimmed.parse::<u64>() { return Ok(Value::from(n)) }
      fallback()
    }

    SimpleKind::Decimal => {
      // from_f64 rejects the infinities and NaN, which json can't hold
      match text.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(n) => Ok(Value::Number(n)),
        None => fallback(),
      }
    }

    SimpleKind::Boolean => match text.trim() {
      "true" | "1" => Ok(Value::Bool(true)),
      "false" | "0" => Ok(Value::Bool(false)),
      _ => fallback(),
    }

    SimpleKind::List(item) => text
      .split_whitespace()
      .map(|t| leaf_value(element, t, item, validation))
      .collect::<Result<Vec<Value>, DecodeError>>()
      .map(Value::Array),
  }
}
