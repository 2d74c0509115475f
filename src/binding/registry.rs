//! Binder resolution with annotation → class → fallback precedence.

use super::binders::{
    BodyBinder, CookieValueBinder, HeaderBinder, PartBinder, PathVariableBinder,
    QueryValueBinder, RequestInfoBinder, UploadBinder, UploadsBinder,
};
use super::{ArgumentBinder, ArgumentSpec, BindingAnnotation, TargetType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of argument binders, built once per server and read-only
/// afterwards.
///
/// Lookup precedence for [`BinderRegistry::find_argument_binder`]:
/// 1. the argument's binding annotation, if one is registered for it;
/// 2. the argument's declared class;
/// 3. the fallback body binder.
///
/// The function is total: it never reports "no binder found". Genuine
/// failure (an unbindable declared type) surfaces at bind time as a
/// conversion error.
pub struct BinderRegistry {
    by_annotation: HashMap<BindingAnnotation, Arc<dyn ArgumentBinder>>,
    by_type: HashMap<TargetType, Arc<dyn ArgumentBinder>>,
    body_binder: Arc<dyn ArgumentBinder>,
}

impl BinderRegistry {
    /// A registry seeded with the built-in binders.
    pub fn new() -> Self {
        let mut by_annotation: HashMap<BindingAnnotation, Arc<dyn ArgumentBinder>> =
            HashMap::new();
        by_annotation.insert(BindingAnnotation::Header, Arc::new(HeaderBinder));
        by_annotation.insert(BindingAnnotation::QueryValue, Arc::new(QueryValueBinder));
        by_annotation.insert(BindingAnnotation::PathVariable, Arc::new(PathVariableBinder));
        by_annotation.insert(BindingAnnotation::CookieValue, Arc::new(CookieValueBinder));
        by_annotation.insert(BindingAnnotation::Part, Arc::new(PartBinder));
        by_annotation.insert(BindingAnnotation::Body, Arc::new(BodyBinder));

        let mut by_type: HashMap<TargetType, Arc<dyn ArgumentBinder>> = HashMap::new();
        by_type.insert(TargetType::RequestInfo, Arc::new(RequestInfoBinder));
        by_type.insert(TargetType::Upload, Arc::new(UploadBinder));
        by_type.insert(TargetType::Uploads, Arc::new(UploadsBinder));

        Self {
            by_annotation,
            by_type,
            body_binder: Arc::new(BodyBinder),
        }
    }

    /// Register or replace an annotation-keyed binder.
    pub fn register_annotation_binder(
        &mut self,
        annotation: BindingAnnotation,
        binder: Arc<dyn ArgumentBinder>,
    ) {
        self.by_annotation.insert(annotation, binder);
    }

    /// Register or replace a class-keyed binder.
    pub fn register_type_binder(&mut self, target: TargetType, binder: Arc<dyn ArgumentBinder>) {
        self.by_type.insert(target, binder);
    }

    /// Resolve the binder for one argument. Always succeeds.
    pub fn find_argument_binder(&self, spec: &ArgumentSpec) -> Arc<dyn ArgumentBinder> {
        if let Some(annotation) = spec.annotation {
            if let Some(binder) = self.by_annotation.get(&annotation) {
                debug!(argument = %spec.name, ?annotation, "binder resolved by annotation");
                return binder.clone();
            }
        }
        if let Some(binder) = self.by_type.get(&spec.target) {
            debug!(argument = %spec.name, target = ?spec.target, "binder resolved by declared type");
            return binder.clone();
        }
        debug!(argument = %spec.name, "binder resolved to body fallback");
        self.body_binder.clone()
    }
}

impl Default for BinderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
