//! Code-page registry: token dictionaries of a WBXML language.
//!
//! A [`Profile`] is plain `'static` data. Lookups never allocate and never
//! mutate, so one profile may be shared by any number of threads.

use crate::activesync::ACTIVESYNC;

/// One numbered namespace of tag tokens.
#[derive(Debug)]
pub struct CodePage {
    pub page: u8,
    /// Namespace URI as written by the decoder, e.g. `AirSync:`.
    pub namespace: &'static str,
    /// `(token, tag name)` pairs, tokens in `0x05..=0x3F`.
    pub tags: &'static [(u8, &'static str)],
    /// Tags whose character content travels as OPAQUE data.
    pub opaque: &'static [u8],
}

/// Attribute start token. The token stands for the attribute name and, when
/// `value_prefix` is not empty, for the beginning of its value as well.
#[derive(Debug, PartialEq, Eq)]
pub struct AttrStartEntry {
    pub page: u8,
    pub token: u8,
    pub name: &'static str,
    pub value_prefix: &'static str,
}

/// Attribute value token (always `>= 0x80`).
#[derive(Debug, PartialEq, Eq)]
pub struct AttrValueEntry {
    pub page: u8,
    pub token: u8,
    pub value: &'static str,
}

/// Position of a tag in a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagToken {
    pub page: u8,
    pub token: u8,
}

/// A WBXML language definition.
#[derive(Debug)]
pub struct Profile {
    pub name: &'static str,
    /// Registered numeric public identifier, if the language has one.
    pub public_id: Option<u32>,
    /// Formal public identifier used in the DOCTYPE.
    pub fpi: &'static str,
    pub dtd: &'static str,
    /// Root name written in the DOCTYPE.
    pub doctype_root: &'static str,
    pub pages: &'static [CodePage],
    pub attr_starts: &'static [AttrStartEntry],
    pub attr_values: &'static [AttrValueEntry],
}

static PROFILES: &[&Profile] = &[&ACTIVESYNC];

/// All built-in profiles.
pub fn profiles() -> &'static [&'static Profile] {
    PROFILES
}

/// Find a built-in profile by name, ignoring ASCII case.
pub fn lookup_profile(name: &str) -> Option<&'static Profile> {
    PROFILES
        .iter()
        .copied()
        .find(|profile| profile.name.eq_ignore_ascii_case(name))
}

pub(crate) fn same_namespace(a: &str, b: &str) -> bool {
    a.trim_end_matches(':')
        .eq_ignore_ascii_case(b.trim_end_matches(':'))
}

impl Profile {
    pub fn code_page(&self, page: u8) -> Option<&CodePage> {
        self.pages.iter().find(|p| p.page == page)
    }

    /// Namespace URI of a code page.
    pub fn namespace(&self, page: u8) -> Option<&'static str> {
        self.code_page(page).map(|p| p.namespace)
    }

    /// Code page bound to a namespace URI; `AirSync` and `AirSync:` are the same.
    pub fn page_for_namespace(&self, uri: &str) -> Option<u8> {
        self.pages
            .iter()
            .find(|p| same_namespace(p.namespace, uri))
            .map(|p| p.page)
    }

    /// Resolve a tag. A namespace that names a code page restricts the search
    /// to that page; otherwise the current page is tried first, then all pages.
    pub fn tag_token(
        &self,
        namespace: Option<&str>,
        name: &str,
        current_page: u8,
    ) -> Option<TagToken> {
        if let Some(page) = namespace.and_then(|ns| self.page_for_namespace(ns)) {
            return self.find_tag_in(page, name);
        }
        self.find_tag_in(current_page, name).or_else(|| {
            self.pages
                .iter()
                .filter(|p| p.page != current_page)
                .find_map(|p| self.find_tag_in(p.page, name))
        })
    }

    fn find_tag_in(&self, page: u8, name: &str) -> Option<TagToken> {
        let code_page = self.code_page(page)?;
        code_page
            .tags
            .iter()
            .find(|(_, tag)| *tag == name)
            .map(|(token, _)| TagToken {
                page,
                token: *token,
            })
    }

    pub fn tag_name(&self, page: u8, token: u8) -> Option<&'static str> {
        self.code_page(page)?
            .tags
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, name)| *name)
    }

    pub fn is_opaque(&self, tag: TagToken) -> bool {
        self.code_page(tag.page)
            .is_some_and(|p| p.opaque.contains(&tag.token))
    }

    /// Best attribute start for `name="value"`: the longest value prefix wins,
    /// entries on the current attribute page win ties.
    pub fn attr_start(&self, name: &str, value: &str, current_page: u8) -> Option<&AttrStartEntry> {
        self.attr_starts
            .iter()
            .filter(|entry| entry.name == name && value.starts_with(entry.value_prefix))
            .max_by_key(|entry| (entry.value_prefix.len(), entry.page == current_page))
    }

    pub fn attr_start_by_token(&self, page: u8, token: u8) -> Option<&AttrStartEntry> {
        self.attr_starts
            .iter()
            .find(|entry| entry.page == page && entry.token == token)
    }

    pub fn attr_value(&self, value: &str, current_page: u8) -> Option<&AttrValueEntry> {
        let mut matches = self.attr_values.iter().filter(|entry| entry.value == value);
        let first = matches.next()?;
        if first.page == current_page {
            return Some(first);
        }
        Some(matches.find(|entry| entry.page == current_page).unwrap_or(first))
    }

    pub fn attr_value_by_token(&self, page: u8, token: u8) -> Option<&AttrValueEntry> {
        self.attr_values
            .iter()
            .find(|entry| entry.page == page && entry.token == token)
    }
}
