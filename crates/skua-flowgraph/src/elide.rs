//! Type-check elision
//!
//! Decides when a runtime type check can be skipped because static type
//! analysis already guarantees the outcome.

use crate::flags::BuilderConfig;
use skua_types::{AbstractType, TypeSystem};

/// Whether a check of a value with static type `static_type` against
/// `dst_type` can be elided. `None` means the value's static type is
/// unknown (e.g. an incoming parameter); such checks survive unless the
/// destination type alone makes them vacuous.
pub fn can_skip_type_check(
    static_type: Option<&AbstractType>,
    dst_type: &AbstractType,
    types: &TypeSystem,
    config: &BuilderConfig,
) -> bool {
    assert!(dst_type.is_finalized());
    if !config.eliminate_type_checks {
        return false;
    }

    // Every value is assignable to dynamic, Object and void.
    if !dst_type.is_malformed()
        && (dst_type.is_dynamic_type()
            || types.is_object_type(dst_type)
            || dst_type.is_void_type())
    {
        return true;
    }

    let static_type = match static_type {
        Some(ty) => ty,
        None => return false,
    };
    assert!(!static_type.is_malformed());

    // A void-typed value may only be null, which the check must verify.
    if static_type.is_void_type() {
        return false;
    }

    // A Null-typed value can only be a real null at a check site; the
    // runtime's internal sentinel instances occur as constants only and
    // never reach a type check as heap values.
    if types.is_null_type(static_type) {
        return true;
    }

    // Subtyping is not transitive at run time, but "more specific than"
    // is, so it transfers from the static type to the runtime type.
    types.is_more_specific_than(static_type, dst_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skua_types::{Class, TypeSystem};

    fn config() -> BuilderConfig {
        BuilderConfig::default()
    }

    #[test]
    fn test_dynamic_object_void_destinations() {
        let ts = TypeSystem::new();
        let cfg = config();
        assert!(can_skip_type_check(None, &AbstractType::dynamic(), &ts, &cfg));
        assert!(can_skip_type_check(None, &ts.object_type(), &ts, &cfg));
        assert!(can_skip_type_check(None, &AbstractType::void_type(), &ts, &cfg));
        assert!(!can_skip_type_check(None, &ts.bool_type(), &ts, &cfg));
    }

    #[test]
    fn test_flag_disables_everything() {
        let ts = TypeSystem::new();
        let mut cfg = config();
        cfg.eliminate_type_checks = false;
        assert!(!can_skip_type_check(None, &AbstractType::dynamic(), &ts, &cfg));
        assert!(!can_skip_type_check(
            Some(&ts.null_type()),
            &ts.bool_type(),
            &ts,
            &cfg
        ));
    }

    #[test]
    fn test_null_static_type_is_elided() {
        let ts = TypeSystem::new();
        assert!(can_skip_type_check(
            Some(&ts.null_type()),
            &ts.bool_type(),
            &ts,
            &config()
        ));
    }

    #[test]
    fn test_void_static_type_is_never_elided() {
        let ts = TypeSystem::new();
        assert!(!can_skip_type_check(
            Some(&AbstractType::void_type()),
            &ts.bool_type(),
            &ts,
            &config()
        ));
    }

    #[test]
    fn test_more_specific_static_type() {
        let mut ts = TypeSystem::new();
        let animal = ts.register_class(Class::new("Animal", Some(TypeSystem::OBJECT)));
        let cat = ts.register_class(Class::new("Cat", Some(animal)));
        let cat_ty = AbstractType::class_type(cat);
        let animal_ty = AbstractType::class_type(animal);
        let cfg = config();
        assert!(can_skip_type_check(Some(&cat_ty), &animal_ty, &ts, &cfg));
        assert!(!can_skip_type_check(Some(&animal_ty), &cat_ty, &ts, &cfg));
    }

    #[test]
    fn test_malformed_destination_not_vacuous() {
        let ts = TypeSystem::new();
        assert!(!can_skip_type_check(
            None,
            &AbstractType::malformed(),
            &ts,
            &config()
        ));
    }
}
