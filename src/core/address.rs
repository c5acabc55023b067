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

use crate::{Addr, Address, ContentId, Group};

impl<'x> Addr<'x> {
    pub fn new(display_name: Option<&'x str>, local_part: &'x str, domain: &'x str) -> Self {
        Addr {
            display_name: display_name.map(|name| name.into()),
            local_part: local_part.into(),
            domain: domain.into(),
            simple_address: false,
            comments: Vec::new(),
        }
    }

    pub fn new_simple(local_part: &'x str, domain: &'x str) -> Self {
        Addr {
            display_name: None,
            local_part: local_part.into(),
            domain: domain.into(),
            simple_address: true,
            comments: Vec::new(),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the addr-spec as `local-part@domain`.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }

    pub fn into_owned(self) -> Addr<'static> {
        Addr {
            display_name: self.display_name.map(|s| s.into_owned().into()),
            local_part: self.local_part.into_owned().into(),
            domain: self.domain.into_owned().into(),
            simple_address: self.simple_address,
            comments: self
                .comments
                .into_iter()
                .map(|s| s.into_owned().into())
                .collect(),
        }
    }
}

impl<'x> Group<'x> {
    pub fn new(name: &'x str, addresses: Vec<Addr<'x>>) -> Self {
        Group {
            name: name.into(),
            addresses,
        }
    }

    pub fn into_owned(self) -> Group<'static> {
        Group {
            name: self.name.into_owned().into(),
            addresses: self.addresses.into_iter().map(|a| a.into_owned()).collect(),
        }
    }
}

impl<'x> Address<'x> {
    /// Returns the first mailbox, descending into groups.
    pub fn first(&self) -> Option<&Addr<'x>> {
        match self {
            Address::Addr(addr) => Some(addr),
            Address::Group(group) => group.addresses.first(),
        }
    }

    /// Returns an iterator over all mailboxes, descending into groups.
    pub fn iter<'y: 'x>(&'y self) -> Box<dyn Iterator<Item = &'y Addr<'x>> + 'y> {
        match self {
            Address::Addr(addr) => Box::new(std::iter::once(addr)),
            Address::Group(group) => Box::new(group.addresses.iter()),
        }
    }

    pub fn as_addr(&self) -> Option<&Addr<'x>> {
        match self {
            Address::Addr(addr) => Some(addr),
            Address::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group<'x>> {
        match self {
            Address::Addr(_) => None,
            Address::Group(group) => Some(group),
        }
    }

    pub fn into_owned(self) -> Address<'static> {
        match self {
            Address::Addr(addr) => Address::Addr(addr.into_owned()),
            Address::Group(group) => Address::Group(group.into_owned()),
        }
    }
}

impl<'x> ContentId<'x> {
    pub fn new(local_part: &'x str, domain: &'x str) -> Self {
        ContentId {
            local_part: local_part.into(),
            domain: domain.into(),
        }
    }

    pub fn into_owned(self) -> ContentId<'static> {
        ContentId {
            local_part: self.local_part.into_owned().into(),
            domain: self.domain.into_owned().into(),
        }
    }
}

impl fmt::Display for Addr<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}@{}", self.local_part, self.domain)
    }
}

impl fmt::Display for ContentId<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "<{}@{}>", self.local_part, self.domain)
    }
}
