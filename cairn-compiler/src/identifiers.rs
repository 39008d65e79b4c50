//! Identifier table and scoped resolution
//!
//! Lookup walks from the most specific enclosing scope outward; the innermost
//! scope wins. A name with a trailing member path against a struct yields the
//! member (or the `SIZE` pseudo-member); against a reference it yields an
//! offset-reference, deferred to flow-tracking evaluation.

use crate::ast::{Expr, TypeExpr};
use crate::error::{IdentifierError, PreprocessorError};
use crate::format::{format_expr, format_type};
use cairn_spec::program::{IdentifierDefinition, MemberDefinition, ReferenceData};
use cairn_spec::{ApTracking, Felt, ScopedName};
use std::collections::BTreeMap;

/// The reserved member name resolving to a struct's total size
pub const SIZE_MEMBER: &str = "SIZE";

/// One binding of a reference at a program point
#[derive(Debug, Clone, PartialEq)]
pub struct RefBinding {
    pub pc: usize,
    pub value: Expr,
    pub ap_tracking: ApTracking,
    pub ty: Option<TypeExpr>,
}

/// A struct field
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeExpr,
    pub offset: usize,
}

/// Compiler-side identifier definitions; frozen into the program table at the
/// end of compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Const(Felt),
    /// pc is assigned during code generation
    Label(Option<usize>),
    Reference(Vec<RefBinding>),
    Function { pc: Option<usize> },
    Struct { members: Vec<StructMember>, size: usize },
    Namespace,
    Alias(ScopedName),
}

impl Definition {
    fn kind_name(&self) -> &'static str {
        match self {
            Definition::Const(_) => "a constant",
            Definition::Label(_) => "a label",
            Definition::Reference(_) => "a reference",
            Definition::Function { .. } => "a function",
            Definition::Struct { .. } => "a struct",
            Definition::Namespace => "a namespace",
            Definition::Alias(_) => "an alias",
        }
    }
}

/// Result of a successful search: the canonical definition plus any unresolved
/// member-path suffix (non-empty only for struct/reference accesses).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub canonical_name: ScopedName,
    pub definition: Definition,
    pub member_path: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierManager {
    map: BTreeMap<ScopedName, Definition>,
}

impl IdentifierManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Redefinition in the same scope is an error,
    /// except re-opening a namespace.
    pub fn add(
        &mut self,
        name: ScopedName,
        definition: Definition,
    ) -> Result<(), PreprocessorError> {
        match (self.map.get(&name), &definition) {
            (Some(Definition::Namespace), Definition::Namespace) => Ok(()),
            (Some(_), _) => Err(PreprocessorError::Redefinition {
                name,
                location: None,
            }),
            (None, _) => {
                self.map.insert(name, definition);
                Ok(())
            }
        }
    }

    pub fn get_exact(&self, name: &ScopedName) -> Option<&Definition> {
        self.map.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ScopedName, &Definition)> {
        self.map.iter()
    }

    pub fn get_mut(&mut self, name: &ScopedName) -> Option<&mut Definition> {
        self.map.get_mut(name)
    }

    /// Append a reference binding, creating the reference on first use
    pub fn add_reference_binding(
        &mut self,
        name: ScopedName,
        binding: RefBinding,
    ) -> Result<(), PreprocessorError> {
        match self.map.get_mut(&name) {
            Some(Definition::Reference(bindings)) => {
                bindings.push(binding);
                Ok(())
            }
            Some(_) => Err(PreprocessorError::Redefinition {
                name,
                location: None,
            }),
            None => {
                self.map.insert(name, Definition::Reference(vec![binding]));
                Ok(())
            }
        }
    }

    /// Assign the pc of a previously collected label or function
    pub fn set_pc(&mut self, name: &ScopedName, pc: usize) {
        match self.map.get_mut(name) {
            Some(Definition::Label(slot)) => *slot = Some(pc),
            Some(Definition::Function { pc: slot }) => *slot = Some(pc),
            _ => {}
        }
    }

    /// Search `name` from `scope` outward to the root, following aliases.
    ///
    /// In each scope the longest declared prefix of `name` wins; any
    /// remaining segments become the member path of the result.
    pub fn search(
        &self,
        scope: &ScopedName,
        name: &ScopedName,
    ) -> Result<SearchResult, IdentifierError> {
        let mut searched = Vec::new();
        let mut current = scope.clone();
        loop {
            searched.push(current.clone());
            if let Some(result) = self.lookup_in_scope(&current, name)? {
                return Ok(result);
            }
            if current.is_empty() {
                break;
            }
            current = current.parent();
        }
        Err(IdentifierError::Missing {
            name: name.clone(),
            searched_scopes: searched,
        })
    }

    fn lookup_in_scope(
        &self,
        scope: &ScopedName,
        name: &ScopedName,
    ) -> Result<Option<SearchResult>, IdentifierError> {
        // Longest declared prefix wins within one scope
        let segments = name.segments();
        for prefix_len in (1..=segments.len()).rev() {
            let prefix = ScopedName::new(segments[..prefix_len].to_vec())
                .expect("segments are already validated");
            let full = scope.concat(&prefix);
            if let Some(definition) = self.map.get(&full) {
                let member_path = segments[prefix_len..].to_vec();
                let resolved = self.follow_alias(full, definition.clone(), member_path)?;
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    fn follow_alias(
        &self,
        name: ScopedName,
        definition: Definition,
        member_path: Vec<String>,
    ) -> Result<SearchResult, IdentifierError> {
        let mut canonical = name.clone();
        let mut definition = definition;
        let mut member_path = member_path;
        let mut hops = 0;
        while let Definition::Alias(destination) = definition.clone() {
            hops += 1;
            if hops > self.map.len() {
                return Err(IdentifierError::AliasCycle { name });
            }
            // The alias destination may itself carry further path segments
            let mut target = destination.clone();
            for segment in &member_path {
                target = target
                    .child(segment)
                    .expect("member segments are validated");
            }
            member_path = Vec::new();
            // Peel trailing segments until a declared name is found
            let mut suffix: Vec<String> = Vec::new();
            loop {
                if let Some(def) = self.map.get(&target) {
                    canonical = target;
                    definition = def.clone();
                    suffix.reverse();
                    member_path = suffix;
                    break;
                }
                match target.last() {
                    Some(last) if target.len() > 1 => {
                        suffix.push(last.to_string());
                        target = target.parent();
                    }
                    _ => {
                        return Err(IdentifierError::Missing {
                            name: destination.clone(),
                            searched_scopes: vec![ScopedName::root()],
                        })
                    }
                }
            }
        }
        Ok(SearchResult {
            canonical_name: canonical,
            definition,
            member_path,
        })
    }

    /// Resolve a member path against a struct definition: either the `SIZE`
    /// pseudo-member (a constant) or a declared field (a member definition).
    pub fn resolve_struct_member(
        &self,
        struct_name: &ScopedName,
        members: &[StructMember],
        size: usize,
        path: &[String],
    ) -> Result<ResolvedMember, IdentifierError> {
        let first = &path[0];
        if first == SIZE_MEMBER {
            if path.len() > 1 {
                return Err(IdentifierError::NotAStruct {
                    name: struct_name.child(SIZE_MEMBER).unwrap(),
                    member: path[1].clone(),
                });
            }
            return Ok(ResolvedMember::Size(Felt::from(size)));
        }
        let member = members
            .iter()
            .find(|m| &m.name == first)
            .ok_or_else(|| IdentifierError::NoSuchMember {
                name: struct_name.clone(),
                member: first.clone(),
            })?;
        if path.len() == 1 {
            return Ok(ResolvedMember::Member {
                offset: member.offset,
                ty: member.ty.clone(),
            });
        }
        // The path continues: the member must itself be a named struct
        match &member.ty {
            TypeExpr::Named(inner) => {
                let inner_result = self.search(&ScopedName::root(), inner)?;
                match inner_result.definition {
                    Definition::Struct {
                        members: inner_members,
                        size: inner_size,
                    } => {
                        let nested = self.resolve_struct_member(
                            &inner_result.canonical_name,
                            &inner_members,
                            inner_size,
                            &path[1..],
                        )?;
                        match nested {
                            ResolvedMember::Member { offset, ty } => Ok(ResolvedMember::Member {
                                offset: member.offset + offset,
                                ty,
                            }),
                            size_member => Ok(size_member),
                        }
                    }
                    _ => Err(IdentifierError::NotAStruct {
                        name: inner_result.canonical_name,
                        member: path[1].clone(),
                    }),
                }
            }
            _ => Err(IdentifierError::NotAStruct {
                name: struct_name.child(first).unwrap(),
                member: path[1].clone(),
            }),
        }
    }

    /// Total cell size of a type; named types are resolved from `scope`
    pub fn type_size(
        &self,
        scope: &ScopedName,
        ty: &TypeExpr,
    ) -> Result<usize, IdentifierError> {
        match ty {
            TypeExpr::Felt | TypeExpr::Pointer(_) => Ok(1),
            TypeExpr::Tuple(items) => {
                let mut total = 0;
                for item in items {
                    total += self.type_size(scope, item)?;
                }
                Ok(total)
            }
            TypeExpr::Named(name) => {
                let result = self.search(scope, name)?;
                match result.definition {
                    Definition::Struct { size, .. } => Ok(size),
                    other => Err(IdentifierError::UnexpectedKind {
                        name: result.canonical_name,
                        expected: "a struct",
                        found: other.kind_name(),
                    }),
                }
            }
        }
    }

    /// Freeze into the serializable program identifier table
    pub fn freeze(&self) -> BTreeMap<ScopedName, IdentifierDefinition> {
        self.map
            .iter()
            .map(|(name, definition)| {
                let frozen = match definition {
                    Definition::Const(value) => IdentifierDefinition::Const {
                        value: value.clone(),
                    },
                    Definition::Label(pc) => IdentifierDefinition::Label {
                        pc: pc.unwrap_or_default(),
                    },
                    Definition::Reference(bindings) => IdentifierDefinition::Reference {
                        references: bindings
                            .iter()
                            .map(|b| ReferenceData {
                                pc: b.pc,
                                value: format_expr(&b.value),
                                ap_tracking: b.ap_tracking,
                            })
                            .collect(),
                    },
                    Definition::Function { pc } => IdentifierDefinition::Function {
                        pc: pc.unwrap_or_default(),
                    },
                    Definition::Struct { members, size } => IdentifierDefinition::Struct {
                        members: members
                            .iter()
                            .map(|m| {
                                (
                                    m.name.clone(),
                                    MemberDefinition {
                                        offset: m.offset,
                                        ty: format_type(&m.ty),
                                    },
                                )
                            })
                            .collect(),
                        size: *size,
                    },
                    Definition::Namespace => IdentifierDefinition::Namespace,
                    Definition::Alias(destination) => IdentifierDefinition::Alias {
                        destination: destination.clone(),
                    },
                };
                (name.clone(), frozen)
            })
            .collect()
    }
}

/// Outcome of a struct member-path resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMember {
    /// The `SIZE` pseudo-member
    Size(Felt),
    Member { offset: usize, ty: TypeExpr },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ScopedName {
        ScopedName::from_string(s).unwrap()
    }

    fn manager_with_basics() -> IdentifierManager {
        let mut m = IdentifierManager::new();
        m.add(name("__main__"), Definition::Namespace).unwrap();
        m.add(name("__main__.N"), Definition::Const(Felt::from(5u64)))
            .unwrap();
        m.add(
            name("__main__.Point"),
            Definition::Struct {
                members: vec![
                    StructMember {
                        name: "x".to_string(),
                        ty: TypeExpr::Felt,
                        offset: 0,
                    },
                    StructMember {
                        name: "y".to_string(),
                        ty: TypeExpr::Felt,
                        offset: 1,
                    },
                ],
                size: 2,
            },
        )
        .unwrap();
        m
    }

    #[test]
    fn test_innermost_scope_wins() {
        let mut m = manager_with_basics();
        m.add(name("__main__.f"), Definition::Namespace).unwrap();
        m.add(name("__main__.f.N"), Definition::Const(Felt::from(9u64)))
            .unwrap();
        let result = m.search(&name("__main__.f"), &name("N")).unwrap();
        assert_eq!(result.definition, Definition::Const(Felt::from(9u64)));
        // From the outer scope the outer constant is found
        let result = m.search(&name("__main__"), &name("N")).unwrap();
        assert_eq!(result.definition, Definition::Const(Felt::from(5u64)));
    }

    #[test]
    fn test_missing_names_searched_scopes() {
        let m = manager_with_basics();
        let err = m.search(&name("__main__.f"), &name("nope")).unwrap_err();
        match err {
            IdentifierError::Missing {
                searched_scopes, ..
            } => {
                assert_eq!(
                    searched_scopes,
                    vec![name("__main__.f"), name("__main__"), ScopedName::root()]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut m = manager_with_basics();
        let err = m
            .add(name("__main__.N"), Definition::Const(Felt::from(1u64)))
            .unwrap_err();
        assert!(matches!(err, PreprocessorError::Redefinition { .. }));
    }

    #[test]
    fn test_struct_member_and_size() {
        let m = manager_with_basics();
        let result = m.search(&name("__main__"), &name("Point.y")).unwrap();
        assert_eq!(result.member_path, vec!["y".to_string()]);
        let Definition::Struct { members, size } = &result.definition else {
            panic!("expected struct");
        };
        let resolved = m
            .resolve_struct_member(&result.canonical_name, members, *size, &result.member_path)
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedMember::Member {
                offset: 1,
                ty: TypeExpr::Felt
            }
        );

        let size_path = vec![SIZE_MEMBER.to_string()];
        let resolved = m
            .resolve_struct_member(&result.canonical_name, members, *size, &size_path)
            .unwrap();
        assert_eq!(resolved, ResolvedMember::Size(Felt::from(2u64)));
    }

    #[test]
    fn test_no_such_member() {
        let m = manager_with_basics();
        let result = m.search(&name("__main__"), &name("Point.z")).unwrap();
        let Definition::Struct { members, size } = &result.definition else {
            panic!("expected struct");
        };
        let err = m
            .resolve_struct_member(&result.canonical_name, members, *size, &result.member_path)
            .unwrap_err();
        assert!(matches!(err, IdentifierError::NoSuchMember { .. }));
    }

    #[test]
    fn test_alias_following() {
        let mut m = manager_with_basics();
        m.add(name("__main__.P"), Definition::Alias(name("__main__.Point")))
            .unwrap();
        let result = m.search(&name("__main__"), &name("P.x")).unwrap();
        assert_eq!(result.canonical_name, name("__main__.Point"));
        assert_eq!(result.member_path, vec!["x".to_string()]);
    }

    #[test]
    fn test_type_size() {
        let m = manager_with_basics();
        assert_eq!(m.type_size(&name("__main__"), &TypeExpr::Felt).unwrap(), 1);
        assert_eq!(
            m.type_size(
                &name("__main__"),
                &TypeExpr::Named(name("Point"))
            )
            .unwrap(),
            2
        );
        assert_eq!(
            m.type_size(
                &name("__main__"),
                &TypeExpr::Tuple(vec![TypeExpr::Felt, TypeExpr::Named(name("Point"))])
            )
            .unwrap(),
            3
        );
    }
}
