//! The contract every operation declares about its markup element.

/// Attribute accepted on every element (diagnostic label only).
const UNIVERSAL_ATTRIBUTES: &[&str] = &["id"];

/// Static description of an element: its name, attributes, and child slots.
#[derive(Debug, Clone, Copy)]
pub struct ElementInfo {
    /// Short (local) element name.
    pub name: &'static str,
    /// Attributes the element accepts. Anything else is rejected at resolution.
    pub valid_attributes: &'static [&'static str],
    /// Attributes that must be present.
    pub required_attributes: &'static [&'static str],
    /// Named sub-elements, in declaration order.
    pub slots: &'static [SlotSpec],
}

impl ElementInfo {
    /// Element with no attributes and no slots.
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            valid_attributes: &[],
            required_attributes: &[],
            slots: &[],
        }
    }

    pub fn is_valid_attribute(&self, attribute: &str) -> bool {
        UNIVERSAL_ATTRIBUTES.contains(&attribute)
            || self.valid_attributes.contains(&attribute)
            || self.required_attributes.contains(&attribute)
    }

    pub fn slot(&self, name: &str) -> Option<&'static SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }
}

/// A named sub-element slot, resolved as a body container of its parent.
#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    pub name: &'static str,
    pub required: bool,
    /// May appear more than once (e.g. `if` inside `case`).
    pub repeatable: bool,
    pub valid_attributes: &'static [&'static str],
    pub required_attributes: &'static [&'static str],
}

impl SlotSpec {
    /// A mandatory, single, attribute-less slot.
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            repeatable: false,
            valid_attributes: &[],
            required_attributes: &[],
        }
    }

    /// An optional, single, attribute-less slot.
    pub const fn optional(name: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }

    /// Element contract of the slot node itself.
    pub fn element_info(&self) -> ElementInfo {
        ElementInfo {
            name: self.name,
            valid_attributes: self.valid_attributes,
            required_attributes: self.required_attributes,
            slots: &[],
        }
    }
}

/// Charset names offered to tooling for `charset` attributes.
const CHARSET_SUGGESTIONS: &[&str] = &[
    "UTF-8",
    "UTF-16LE",
    "UTF-16BE",
    "ISO-8859-1",
    "ISO-8859-2",
    "windows-1250",
    "windows-1251",
    "windows-1252",
    "Shift_JIS",
    "EUC-JP",
    "GBK",
    "Big5",
    "KOI8-R",
];

/// Suggestions shared by every element, keyed on attribute naming conventions.
pub(crate) fn common_suggestions(attribute: &str) -> Option<Vec<String>> {
    let values: &[&str] = match attribute {
        "charset" => CHARSET_SUGGESTIONS,
        "overwrite" | "empty" | "replace" => &["yes", "no"],
        a if a.starts_with("flag-") => &["yes", "no"],
        _ => return None,
    };
    Some(values.iter().map(|v| v.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: ElementInfo = ElementInfo {
        name: "zip-entry",
        valid_attributes: &["charset"],
        required_attributes: &["name"],
        slots: &[],
    };

    #[test]
    fn required_attributes_are_valid() {
        assert!(INFO.is_valid_attribute("name"));
        assert!(INFO.is_valid_attribute("charset"));
        assert!(INFO.is_valid_attribute("id"));
        assert!(!INFO.is_valid_attribute("nmae"));
    }

    #[test]
    fn charset_and_flag_suggestions() {
        assert!(common_suggestions("charset").unwrap().contains(&"UTF-8".to_string()));
        assert_eq!(
            common_suggestions("flag-dotall").unwrap(),
            vec!["yes".to_string(), "no".to_string()]
        );
        assert!(common_suggestions("name").is_none());
    }
}
