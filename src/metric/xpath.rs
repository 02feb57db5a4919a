//! Element path normalization
//!
//! Stored element paths come in three syntaxes:
//!
//! - legacy, fully index-based: `/*[1][self::HTML]/*[2][self::BODY]/*[1][self::DIV]/*[1][self::IMG]`
//! - disambiguated, where the BODY child carries an attribute predicate:
//!   `/HTML/BODY/DIV[@id='page']/*[1][self::IMG]`
//! - transitional: `/HTML/BODY/DIV/*[1][self::IMG]`
//!
//! All of them normalize to the transitional form so that the same DOM node
//! compares equal no matter which syntax captured it.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LEGACY_BODY_CHILD: Regex = Regex::new(
        r"^/\*\[\d+\]\[self::HTML\]/\*\[\d+\]\[self::BODY\]/\*\[\d+\]\[self::([A-Za-z0-9_-]+)\]"
    )
    .unwrap();
    static ref LEGACY_HTML_CHILD: Regex =
        Regex::new(r"^/\*\[\d+\]\[self::HTML\]/\*\[\d+\]\[self::([A-Za-z0-9_-]+)\]").unwrap();
    static ref DISAMBIGUATED_BODY_CHILD: Regex =
        Regex::new(r"^(/HTML/BODY/[A-Za-z0-9_-]+)(?:\[@[^\]]*\])+").unwrap();
}

/// Convert an element path in any supported syntax into the transitional form.
pub fn normalize_xpath(xpath: &str) -> String {
    if LEGACY_BODY_CHILD.is_match(xpath) {
        return LEGACY_BODY_CHILD.replace(xpath, "/HTML/BODY/${1}").into_owned();
    }
    if LEGACY_HTML_CHILD.is_match(xpath) {
        return LEGACY_HTML_CHILD.replace(xpath, "/HTML/${1}").into_owned();
    }
    DISAMBIGUATED_BODY_CHILD.replace(xpath, "${1}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitional_is_unchanged() {
        assert_eq!(
            normalize_xpath("/HTML/BODY/HEADER/*[1][self::IMG]"),
            "/HTML/BODY/HEADER/*[1][self::IMG]"
        );
    }

    #[test]
    fn test_disambiguating_attribute_removed() {
        assert_eq!(
            normalize_xpath("/HTML/BODY/DIV[@id='page']/*[1][self::IMG]"),
            "/HTML/BODY/DIV/*[1][self::IMG]"
        );
        assert_eq!(
            normalize_xpath("/HTML/BODY/MAIN[@role='main'][@class='site']/*[2][self::P]"),
            "/HTML/BODY/MAIN/*[2][self::P]"
        );
    }

    #[test]
    fn test_legacy_body_path() {
        assert_eq!(
            normalize_xpath("/*[1][self::HTML]/*[2][self::BODY]/*[1][self::DIV]/*[1][self::IMG]"),
            "/HTML/BODY/DIV/*[1][self::IMG]"
        );
    }

    #[test]
    fn test_legacy_head_path() {
        assert_eq!(
            normalize_xpath("/*[1][self::HTML]/*[1][self::HEAD]/*[1][self::META]"),
            "/HTML/HEAD/*[1][self::META]"
        );
    }

    #[test]
    fn test_attribute_predicates_deeper_in_path_are_kept() {
        let xpath = "/HTML/BODY/DIV/*[1][self::IMG][@alt='x']";
        assert_eq!(normalize_xpath(xpath), xpath);
    }
}
