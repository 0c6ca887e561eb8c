// This file is part of the terraform-provider-previder project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::cell::RefCell;

use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Description, Schema};
use tf_provider::value::{Value, ValueList, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::reconcile::{Error, Result};
use crate::validate::is_object_id;

pub(crate) trait WithSchema {
    fn schema() -> Schema;
}

pub(crate) trait WithValidate {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath);
}

pub(crate) trait WithNormalize {
    fn normalize(&mut self, diags: &mut Diagnostics);
}

pub(crate) fn attribute(
    attr_type: AttributeType,
    constraint: AttributeConstraint,
    description: &str,
) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

pub(crate) fn sensitive(attribute: Attribute) -> Attribute {
    Attribute {
        sensitive: true,
        ..attribute
    }
}

pub(crate) fn string_list_type() -> AttributeType {
    AttributeType::List(AttributeType::String.into())
}

/// Report a reconcile error as an error diagnostic
pub(crate) fn report(diags: &mut Diagnostics, action: &str, err: &Error, attr_path: AttributePath) {
    diags.error(err.summary(), format!("{action}: {err}"), attr_path);
}

/// Owned string value, null when the string is empty
pub(crate) fn non_empty<'a>(value: &str) -> ValueString<'a> {
    if value.is_empty() {
        Value::Null
    } else {
        Value::Value(Cow::Owned(value.to_owned()))
    }
}

pub(crate) fn owned<'a>(value: &str) -> ValueString<'a> {
    Value::Value(Cow::Owned(value.to_owned()))
}

/// Known strings of a list, null and unknown elements are skipped
pub(crate) fn strings(list: &ValueList<ValueString>) -> Vec<String> {
    list.iter()
        .flatten()
        .filter_map(|item| item.as_deref_option())
        .map(str::to_owned)
        .collect()
}

pub(crate) fn string_list<'a, S: AsRef<str>>(items: &[S]) -> ValueList<ValueString<'a>> {
    Value::Value(items.iter().map(|item| owned(item.as_ref())).collect())
}

/// Convert a number attribute, null counts as zero
pub(crate) fn number<T: TryFrom<i64>>(what: &str, value: &ValueNumber) -> Result<T> {
    let raw = value.as_ref_option().copied().unwrap_or_default();
    T::try_from(raw).map_err(|_| Error::validation(format!("{what} is out of range: {raw}")))
}

pub(crate) fn unknown_if_null<T>(value: &mut Value<T>) {
    if value.is_null() {
        *value = Value::Unknown;
    }
}

/// Unknown values left in a state returned after a failed apply become null
pub(crate) fn settle<T>(value: &mut Value<T>) {
    if value.is_unknown() {
        *value = Value::Null;
    }
}

/// Value of a reference attribute that may be configured by name or by id
///
/// An id (or no value) follows the remote id, a name follows the remote name.
pub(crate) fn reference<'a>(configured: &ValueString, remote_id: &str, remote_name: &str) -> ValueString<'a> {
    match configured.as_deref_option() {
        Some(value) if !value.is_empty() && !is_object_id(value) => {
            if remote_name.is_empty() {
                owned(value)
            } else {
                owned(remote_name)
            }
        }
        _ => non_empty(remote_id),
    }
}

/// Remote value, or the configured one when the platform does not echo it
pub(crate) fn remote_or<'a>(configured: &ValueString, remote: &str) -> ValueString<'a> {
    if remote.is_empty() {
        configured.clone().extend()
    } else {
        owned(remote)
    }
}

pub struct DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    iter: RefCell<T>,
    sep: &'a str,
}

pub trait DisplayJoinable {
    type Joiner<'a>;
    fn join_with(self, sep: &str) -> Self::Joiner<'_>;
}

impl<T, I> DisplayJoinable for T
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    type Joiner<'a> = DisplayJoiner<'a, T, I>;

    fn join_with(self, sep: &str) -> Self::Joiner<'_> {
        DisplayJoiner {
            iter: RefCell::new(self),
            sep,
        }
    }
}

impl<'a, T, I> std::fmt::Display for DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        let mut iter = self.iter.try_borrow_mut().or(Err(std::fmt::Error))?;
        for elt in iter.by_ref() {
            f.write_str(sep)?;
            f.write_fmt(format_args!("{elt}"))?;
            sep = self.sep;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_with_separator() {
        assert_eq!(["cni", "vips"].iter().join_with(", ").to_string(), "cni, vips");
        assert_eq!(std::iter::empty::<&str>().join_with(", ").to_string(), "");
    }

    #[test]
    fn string_lists_skip_unknown_elements() {
        let list: ValueList<ValueString> = Value::Value(vec![
            Value::from("10.0.0.1"),
            Value::Unknown,
            Value::Null,
            Value::from("10.0.0.2"),
        ]);
        assert_eq!(strings(&list), vec!["10.0.0.1", "10.0.0.2"]);
        assert!(strings(&Value::Unknown).is_empty());
    }

    #[test]
    fn numbers_must_fit() {
        assert_eq!(number::<u32>("cpu_cores", &Value::Value(4)).unwrap(), 4);
        assert_eq!(number::<u32>("cpu_cores", &Value::Null).unwrap(), 0);
        let err = number::<u32>("cpu_cores", &Value::Value(-1)).unwrap_err();
        assert_eq!(err.to_string(), "cpu_cores is out of range: -1");
    }

    #[test]
    fn references_follow_the_configured_form() {
        let id = "5a8c0e2a9f1b2c3d4e5f6a7b";
        assert_eq!(reference(&Value::from("web"), id, "web"), Value::from("web"));
        assert_eq!(reference(&Value::from(id), id, "web"), Value::from(id));
        assert_eq!(reference(&Value::Unknown, id, "web"), Value::from(id));
        assert_eq!(reference(&Value::Null, "", ""), Value::Null);
    }
}
