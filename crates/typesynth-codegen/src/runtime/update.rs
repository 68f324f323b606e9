//! Evaluation of patch functions.

use indexmap::IndexMap;

use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Presence, WrapperKind};

use crate::defs::{Body, FunctionKind};
use crate::patch::{AbsentValue, PatchBody, PatchField};

use super::error::RuntimeError;
use super::value::Value;
use super::Runtime;

impl Runtime<'_> {
    /// Lifts `value` into a patch that sets every patchable field.
    pub fn patch_from_value(&self, name: &QualifiedName, value: &Value) -> Result<Value, RuntimeError> {
        let body = self.patch_body(name, FunctionKind::PatchFromValue)?;
        let mut out = IndexMap::new();
        for field in &body.fields {
            let v = value.field(&field.name)?;
            out.insert(field.name.clone(), Value::defined(WrapperKind::Und, v.clone()));
        }
        Ok(Value::Record(out))
    }

    /// Resolves `patch` into a value. Unset fields, and fields the patch
    /// does not carry, get their zero value.
    pub fn patch_to_value(&self, name: &QualifiedName, patch: &Value) -> Result<Value, RuntimeError> {
        let body = self.patch_body(name, FunctionKind::PatchToValue)?;
        let entry = self
            .universe
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownType { name: name.clone() })?;
        let mut out = IndexMap::new();
        for field in entry.fields() {
            let value = match body.fields.iter().find(|f| f.name == field.name) {
                Some(pf) => self.resolve_entry(pf, patch_entry(patch, &pf.name)?)?,
                None => self.zero_value(&field.ty)?,
            };
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Record(out))
    }

    /// Field-wise merge; `right` wins wherever it is not undefined.
    pub fn patch_merge(
        &self,
        name: &QualifiedName,
        left: &Value,
        right: &Value,
    ) -> Result<Value, RuntimeError> {
        let body = self.patch_body(name, FunctionKind::PatchMerge)?;
        let mut out = IndexMap::new();
        for field in &body.fields {
            let l = patch_entry(left, &field.name)?;
            let r = patch_entry(right, &field.name)?;
            let winner = match r.state() {
                Some(Presence::Undefined) => l,
                _ => r,
            };
            out.insert(field.name.clone(), winner);
        }
        Ok(Value::Record(out))
    }

    /// Applies `patch` on top of `value`.
    pub fn patch_apply(
        &self,
        name: &QualifiedName,
        value: &Value,
        patch: &Value,
    ) -> Result<Value, RuntimeError> {
        self.patch_body(name, FunctionKind::PatchApply)?;
        let lifted = self.patch_from_value(name, value)?;
        let merged = self.patch_merge(name, &lifted, patch)?;
        self.patch_to_value(name, &merged)
    }

    fn patch_body(&self, name: &QualifiedName, kind: FunctionKind) -> Result<PatchBody, RuntimeError> {
        let function = self.require(name, kind)?;
        match &function.body {
            Body::Patch(body) => Ok(body.clone()),
            _ => Err(RuntimeError::TypeMismatch {
                expected: "patch body".into(),
                got: function.signature.name.clone(),
            }),
        }
    }

    fn resolve_entry(&self, field: &PatchField, entry: Value) -> Result<Value, RuntimeError> {
        match entry.state() {
            Some(Presence::Undefined) => self.zero_value(&field.ty),
            Some(Presence::Null) => match field.absent {
                AbsentValue::WrapperNull => self.absent_value(&field.ty),
                AbsentValue::NilReference | AbsentValue::Zero => self.zero_value(&field.ty),
            },
            Some(Presence::Defined) => match entry {
                Value::Wrapped { value: Some(v), .. } => Ok(*v),
                other => Err(RuntimeError::TypeMismatch {
                    expected: "defined payload".into(),
                    got: other.type_name().into(),
                }),
            },
            None => Err(RuntimeError::TypeMismatch {
                expected: "wrapper".into(),
                got: entry.type_name().into(),
            }),
        }
    }
}

/// A patch entry; a field missing from the patch record is unset.
fn patch_entry(patch: &Value, field: &str) -> Result<Value, RuntimeError> {
    match patch {
        Value::Record(fields) => Ok(fields
            .get(field)
            .cloned()
            .unwrap_or_else(|| Value::undefined(WrapperKind::Und))),
        other => Err(RuntimeError::TypeMismatch {
            expected: "patch record".into(),
            got: other.type_name().into(),
        }),
    }
}
