/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt;

use crate::{ContentDisposition, ContentType, MimeVersion, Parameter};

impl<'x> Parameter<'x> {
    pub fn new(name: &'x str, value: &'x str) -> Self {
        Parameter {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn into_owned(self) -> Parameter<'static> {
        Parameter {
            name: self.name.into_owned().into(),
            value: self.value.into_owned().into(),
        }
    }
}

impl<'x> ContentType<'x> {
    pub fn new(c_type: &'x str, c_subtype: &'x str) -> Self {
        ContentType {
            c_type: c_type.into(),
            c_subtype: c_subtype.into(),
            attributes: Vec::new(),
        }
    }

    pub fn c_type(&self) -> &str {
        self.c_type.as_ref()
    }

    pub fn c_subtype(&self) -> &str {
        self.c_subtype.as_ref()
    }

    pub fn is_multipart(&self) -> bool {
        self.c_type == "multipart"
    }

    /// Compares the media type case-insensitively.
    pub fn is_type(&self, c_type: &str, c_subtype: &str) -> bool {
        self.c_type.eq_ignore_ascii_case(c_type) && self.c_subtype.eq_ignore_ascii_case(c_subtype)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Returns the first value of a parameter, comparing the name
    /// case-insensitively. The value case is preserved.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_ref())
    }

    pub fn attributes(&self) -> &[Parameter<'x>] {
        &self.attributes
    }

    pub fn boundary(&self) -> Option<&str> {
        self.attribute("boundary")
    }

    pub fn into_owned(self) -> ContentType<'static> {
        ContentType {
            c_type: self.c_type.into_owned().into(),
            c_subtype: self.c_subtype.into_owned().into(),
            attributes: self
                .attributes
                .into_iter()
                .map(|a| a.into_owned())
                .collect(),
        }
    }
}

impl<'x> ContentDisposition<'x> {
    pub fn new(c_disposition: &'x str) -> Self {
        ContentDisposition {
            c_disposition: c_disposition.into(),
            attributes: Vec::new(),
        }
    }

    pub fn c_disposition(&self) -> &str {
        self.c_disposition.as_ref()
    }

    pub fn is_attachment(&self) -> bool {
        self.c_disposition.eq_ignore_ascii_case("attachment")
    }

    pub fn is_inline(&self) -> bool {
        self.c_disposition.eq_ignore_ascii_case("inline")
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_ref())
    }

    pub fn attributes(&self) -> &[Parameter<'x>] {
        &self.attributes
    }

    pub fn into_owned(self) -> ContentDisposition<'static> {
        ContentDisposition {
            c_disposition: self.c_disposition.into_owned().into(),
            attributes: self
                .attributes
                .into_iter()
                .map(|a| a.into_owned())
                .collect(),
        }
    }
}

/// Returns true when the argument is a valid `type/subtype` pair with
/// exactly one slash and both sides non-empty.
pub fn is_mime_type(value: &str) -> bool {
    let mut slash = 0;
    let mut type_len = 0;
    let mut subtype_len = 0;

    for ch in value.chars() {
        if ch == '/' {
            slash += 1;
        } else if slash == 0 {
            type_len += 1;
        } else {
            subtype_len += 1;
        }
    }

    slash == 1 && type_len > 0 && subtype_len > 0
}

impl MimeVersion {
    /// Parses a MIME-Version value; anything other than `1.0` is
    /// rejected, comments and white space tolerated.
    pub fn parse(value: &str) -> Option<MimeVersion> {
        let mut version = String::with_capacity(3);
        let mut comment_count = 0u32;
        let mut last_ch = ' ';

        for ch in value.chars() {
            match ch {
                '(' if last_ch != '\\' => comment_count += 1,
                ')' if comment_count > 0 && last_ch != '\\' => comment_count -= 1,
                ' ' | '\t' | '\r' | '\n' => (),
                _ if comment_count == 0 => {
                    if version.len() == 3 {
                        return None;
                    }
                    version.push(ch);
                }
                _ => (),
            }
            last_ch = ch;
        }

        if version == "1.0" {
            Some(MimeVersion::V1_0)
        } else {
            None
        }
    }
}

impl fmt::Display for MimeVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("1.0")
    }
}

impl fmt::Display for ContentType<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}/{}", self.c_type, self.c_subtype)
    }
}

impl fmt::Display for ContentDisposition<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.c_disposition.as_ref())
    }
}
