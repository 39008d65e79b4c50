//! Structural type rules
//!
//! The cast legality matrix, evaluated structurally over type expressions.
//! Three cast positions exist: explicit `cast(e, T)`, unpacking through a
//! dereference, and plain assignment.

use crate::ast::TypeExpr;

/// The position a conversion occurs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Explicit,
    Unpacking,
    Assign,
}

fn is_felt_ptr(ty: &TypeExpr) -> bool {
    matches!(ty, TypeExpr::Pointer(inner) if **inner == TypeExpr::Felt)
}

/// Is a conversion from `src` to `dest` legal in position `kind`?
///
/// | src -> dest   | explicit | unpacking | assign |
/// |---------------|----------|-----------|--------|
/// | T -> T        | yes      | yes       | yes    |
/// | felt -> felt* | yes      | yes       | no     |
/// | felt* -> felt | yes      | yes       | no     |
/// | felt* -> T*   | yes      | yes       | no     |
/// | T* -> felt*   | yes      | yes       | yes    |
/// | felt* -> T    | yes      | no        | no     |
/// | T -> felt*    | no       | no        | no     |
pub fn cast_allowed(src: &TypeExpr, dest: &TypeExpr, kind: CastKind) -> bool {
    if src == dest {
        return true;
    }
    match (src, dest) {
        // felt <-> felt*
        (TypeExpr::Felt, d) if is_felt_ptr(d) => kind != CastKind::Assign,
        (s, TypeExpr::Felt) if is_felt_ptr(s) => kind != CastKind::Assign,
        // any pointer narrows to felt* in every position
        (TypeExpr::Pointer(_), d) if is_felt_ptr(d) => true,
        // felt* widens to any pointer, but not by assignment
        (s, TypeExpr::Pointer(_)) if is_felt_ptr(s) => kind != CastKind::Assign,
        // felt* reinterprets as an arbitrary type only explicitly
        (s, _) if is_felt_ptr(s) => kind == CastKind::Explicit,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_spec::ScopedName;

    fn felt() -> TypeExpr {
        TypeExpr::Felt
    }

    fn felt_ptr() -> TypeExpr {
        TypeExpr::Pointer(Box::new(TypeExpr::Felt))
    }

    fn named_ptr() -> TypeExpr {
        TypeExpr::Pointer(Box::new(TypeExpr::Named(
            ScopedName::from_string("Point").unwrap(),
        )))
    }

    fn named() -> TypeExpr {
        TypeExpr::Named(ScopedName::from_string("Point").unwrap())
    }

    #[test]
    fn test_identity_always_allowed() {
        for kind in [CastKind::Explicit, CastKind::Unpacking, CastKind::Assign] {
            assert!(cast_allowed(&named(), &named(), kind));
            assert!(cast_allowed(&felt(), &felt(), kind));
        }
    }

    #[test]
    fn test_felt_to_felt_ptr() {
        assert!(cast_allowed(&felt(), &felt_ptr(), CastKind::Explicit));
        assert!(cast_allowed(&felt(), &felt_ptr(), CastKind::Unpacking));
        assert!(!cast_allowed(&felt(), &felt_ptr(), CastKind::Assign));
    }

    #[test]
    fn test_felt_ptr_to_felt() {
        assert!(cast_allowed(&felt_ptr(), &felt(), CastKind::Explicit));
        assert!(cast_allowed(&felt_ptr(), &felt(), CastKind::Unpacking));
        assert!(!cast_allowed(&felt_ptr(), &felt(), CastKind::Assign));
    }

    #[test]
    fn test_pointer_widening_and_narrowing() {
        // felt* -> T*
        assert!(cast_allowed(&felt_ptr(), &named_ptr(), CastKind::Explicit));
        assert!(cast_allowed(&felt_ptr(), &named_ptr(), CastKind::Unpacking));
        assert!(!cast_allowed(&felt_ptr(), &named_ptr(), CastKind::Assign));
        // T* -> felt*
        assert!(cast_allowed(&named_ptr(), &felt_ptr(), CastKind::Explicit));
        assert!(cast_allowed(&named_ptr(), &felt_ptr(), CastKind::Unpacking));
        assert!(cast_allowed(&named_ptr(), &felt_ptr(), CastKind::Assign));
    }

    #[test]
    fn test_felt_ptr_to_arbitrary_type() {
        assert!(cast_allowed(&felt_ptr(), &named(), CastKind::Explicit));
        assert!(!cast_allowed(&felt_ptr(), &named(), CastKind::Unpacking));
        assert!(!cast_allowed(&felt_ptr(), &named(), CastKind::Assign));
    }

    #[test]
    fn test_arbitrary_type_to_felt_ptr_rejected() {
        assert!(!cast_allowed(&named(), &felt_ptr(), CastKind::Explicit));
        assert!(!cast_allowed(&named(), &felt_ptr(), CastKind::Unpacking));
        assert!(!cast_allowed(&named(), &felt_ptr(), CastKind::Assign));
    }
}
