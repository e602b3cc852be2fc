use std::collections::BTreeMap;
use std::sync::Arc;

use relay_xpath::{ExpandedName, SimpleNode, VariableResolver, XdmAtomicValue, XdmItem, XdmSequence};
use serde_json::Value;

use crate::functions::{ENV_NAMESPACE, FunctionGroup, IN_NAMESPACE, OUT_NAMESPACE};
use crate::message::json_to_sequence;

/// Named values staged on the builder; read-only once the evaluator exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableBinding {
    entries: BTreeMap<ExpandedName, Value>,
}

impl VariableBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: ExpandedName, value: impl Into<Value>) {
        self.entries.insert(name, value.into());
    }

    pub fn get(&self, name: &ExpandedName) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Variables of one evaluator.
///
/// Bound names win. Otherwise `$in:name` and `$out:name` read a header of the current
/// invocation and `$env:NAME` an environment variable; each is the empty sequence when
/// absent. Any other name is undeclared.
#[derive(Debug, Clone)]
pub struct MessageVariableResolver {
    bindings: Arc<VariableBinding>,
}

impl MessageVariableResolver {
    pub fn new(bindings: Arc<VariableBinding>) -> Self {
        Self { bindings }
    }
}

impl VariableResolver<SimpleNode> for MessageVariableResolver {
    fn resolve_variable(&self, name: &ExpandedName) -> Option<XdmSequence<SimpleNode>> {
        if let Some(value) = self.bindings.get(name) {
            return Some(json_to_sequence(value));
        }
        let group = match name.ns_uri.as_deref() {
            Some(IN_NAMESPACE) => FunctionGroup::Input,
            Some(OUT_NAMESPACE) => FunctionGroup::Output,
            Some(ENV_NAMESPACE) => {
                let value = std::env::var(&name.local).ok();
                return Some(value.into_iter().map(|v| XdmItem::Atomic(XdmAtomicValue::String(v))).collect());
            }
            _ => return None,
        };
        Some(group.with_message(|m| m.header_sequence(&name.local)).unwrap_or_default())
    }
}
