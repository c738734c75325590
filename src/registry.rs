//! Method lookup for a registered contract.

use crate::descriptor::{ContractDescriptor, MethodDescriptor, TypeTag};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClosedMethodKey {
    method: String,
    parameter_types: Vec<TypeTag>,
    generic_arguments: Vec<TypeTag>,
}

/// Resolves method names to descriptors.
///
/// Closed generic methods are built once per distinct set of generic
/// arguments and cached. The registry is safe to share across tasks.
#[derive(Debug)]
pub struct Registry {
    contract: ContractDescriptor,
    closed: DashMap<ClosedMethodKey, Arc<MethodDescriptor>>,
}

impl Registry {
    pub fn new(contract: ContractDescriptor) -> Self {
        tracing::debug!(
            contract = %contract.name(),
            methods = contract.methods().len(),
            "Registered contract"
        );
        Self {
            contract,
            closed: DashMap::new(),
        }
    }

    pub fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    /// Finds the descriptor for `name`.
    ///
    /// * Without `parameter_types`, the name must be unique.
    /// * Otherwise candidates are filtered by arity and by generic parameter
    ///   count. A single survivor is used as is; among several, the one whose
    ///   parameter types match exactly wins, and no exact match is ambiguous.
    ///
    /// Open generic methods are closed over `generic_arguments` and cached.
    pub fn resolve(
        &self,
        name: &str,
        parameter_types: Option<&[TypeTag]>,
        generic_arguments: Option<&[TypeTag]>,
    ) -> Result<Arc<MethodDescriptor>> {
        let candidates: Vec<&Arc<MethodDescriptor>> = self.contract.overloads(name).collect();
        if candidates.is_empty() {
            return Err(Error::ContractDefinition(format!(
                "contract `{}` has no method named `{}`",
                self.contract.name(),
                name
            )));
        }

        let found = match parameter_types {
            None => {
                if candidates.len() > 1 {
                    return Err(Error::AmbiguousMethod {
                        method: name.to_string(),
                        candidates: candidates.len(),
                    });
                }
                candidates[0]
            }
            Some(types) => {
                let generic_count = generic_arguments.map_or(0, <[TypeTag]>::len);
                let possible: Vec<_> = candidates
                    .iter()
                    .copied()
                    .filter(|m| {
                        m.parameters().len() == types.len()
                            && m.generic_parameters().len() == generic_count
                    })
                    .collect();

                match possible.len() {
                    0 => {
                        return Err(Error::ContractDefinition(format!(
                            "no suitable method `{}` for parameter types [{}]",
                            name,
                            join_tags(types)
                        )))
                    }
                    1 => possible[0],
                    n => possible
                        .iter()
                        .copied()
                        .find(|m| {
                            m.parameters()
                                .iter()
                                .zip(types)
                                .all(|(p, t)| p.type_tag == *t || is_generic_slot(&p.type_tag))
                        })
                        .ok_or_else(|| Error::AmbiguousMethod {
                            method: name.to_string(),
                            candidates: n,
                        })?,
                }
            }
        };

        match generic_arguments {
            Some(arguments) if found.is_open_generic() => self.close(found, arguments),
            _ => Ok(Arc::clone(found)),
        }
    }

    fn close(&self, method: &Arc<MethodDescriptor>, arguments: &[TypeTag]) -> Result<Arc<MethodDescriptor>> {
        let key = ClosedMethodKey {
            method: method.name().to_string(),
            parameter_types: method.parameter_types(),
            generic_arguments: arguments.to_vec(),
        };

        if let Some(existing) = self.closed.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        // Validate outside the map lock, then let the entry API pick a single winner.
        let closed = Arc::new(method.close(arguments)?);
        let entry = self.closed.entry(key).or_insert(closed);
        tracing::trace!(
            method = %method.name(),
            generic_arguments = %join_tags(arguments),
            "Closed generic method"
        );
        Ok(Arc::clone(entry.value()))
    }
}

fn is_generic_slot(tag: &TypeTag) -> bool {
    let s = tag.as_str();
    s.starts_with('<') && s.ends_with('>')
}

fn join_tags(tags: &[TypeTag]) -> String {
    tags.iter().map(TypeTag::as_str).collect::<Vec<_>>().join(", ")
}
