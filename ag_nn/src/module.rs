//! The [`Module`] trait and the registry that gives modules their tree shape.

use std::fmt;
use std::rc::Rc;

use ag_tensor::prelude::*;

use crate::parameter::Parameter;

/// A differentiable building block with registered parameters and children.
///
/// Implementors build a [`ModuleRegistry`] in their constructor and return it
/// from [`Module::registry`]; the provided methods walk that registry.
pub trait Module {
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    fn registry(&self) -> &ModuleRegistry;

    /// All parameters of this module and its descendants, depth first.
    fn parameters(&self) -> Vec<Parameter> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }

    /// Parameters with dotted names such as `linear1.weight`.
    ///
    /// A parameter registered more than once (tied weights) is listed only
    /// under the first name the walk reaches.
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        let mut all = Vec::new();
        self.registry().collect_parameters("", &mut all);

        let mut out: Vec<(String, Parameter)> = Vec::with_capacity(all.len());
        for (name, param) in all {
            if !out.iter().any(|(_, seen)| seen.ptr_eq(&param)) {
                out.push((name, param));
            }
        }
        out
    }

    /// Descendant modules with dotted names. The receiver itself is not
    /// included.
    fn named_modules(&self) -> Vec<(String, Rc<dyn Module>)> {
        let mut out = Vec::new();
        self.registry().collect_modules("", &mut out);
        out
    }

    /// Clear the gradient of every parameter in the tree.
    fn zero_grad(&self) {
        self.registry().zero_grad();
    }
}

/// Insertion-ordered parameters and child modules of one module.
///
/// Registering a name that already exists replaces the entry in place, so the
/// order of first registration is kept.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    parameters: Vec<(String, Parameter)>,
    modules: Vec<(String, Rc<dyn Module>)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `param` under `name` and hand back a handle to it.
    pub fn register_parameter(&mut self, name: impl Into<String>, param: Parameter) -> Parameter {
        upsert(&mut self.parameters, name.into(), param.clone());
        param
    }

    /// Register `module` under `name` and hand back a typed handle to it.
    pub fn register_module<M: Module + 'static>(
        &mut self,
        name: impl Into<String>,
        module: M,
    ) -> Rc<M> {
        let module = Rc::new(module);
        upsert(&mut self.modules, name.into(), module.clone() as Rc<dyn Module>);
        module
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn module(&self, name: &str) -> Option<&Rc<dyn Module>> {
        self.modules.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Directly registered parameters, in registration order.
    pub fn local_parameters(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.parameters.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Directly registered children, in registration order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Rc<dyn Module>)> {
        self.modules.iter().map(|(n, m)| (n.as_str(), m))
    }

    fn collect_parameters(&self, prefix: &str, out: &mut Vec<(String, Parameter)>) {
        for (name, param) in &self.parameters {
            out.push((join(prefix, name), param.clone()));
        }
        for (name, module) in &self.modules {
            module.registry().collect_parameters(&join(prefix, name), out);
        }
    }

    fn collect_modules(&self, prefix: &str, out: &mut Vec<(String, Rc<dyn Module>)>) {
        for (name, module) in &self.modules {
            let path = join(prefix, name);
            out.push((path.clone(), Rc::clone(module)));
            module.registry().collect_modules(&path, out);
        }
    }

    /// Children first, then own parameters.
    pub fn zero_grad(&self) {
        for (_, module) in &self.modules {
            module.zero_grad();
        }
        for (_, param) in &self.parameters {
            param.zero_grad();
        }
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field(
                "parameters",
                &self.parameters.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "modules",
                &self.modules.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn upsert<T>(entries: &mut Vec<(String, T)>, name: String, value: T) {
    match entries.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = value,
        None => entries.push((name, value)),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf {
        registry: ModuleRegistry,
    }

    impl Leaf {
        fn new() -> Self {
            let mut registry = ModuleRegistry::new();
            registry.register_parameter("w", Parameter::from_data([1.0, 2.0]));
            registry.register_parameter("b", Parameter::from_data(0.5));
            Leaf { registry }
        }
    }

    impl Module for Leaf {
        fn forward(&self, input: &Tensor) -> Result<Tensor> {
            let w = self.registry.parameter("w").map(|p| p.tensor().clone());
            match w {
                Some(w) => input.mul(&w),
                None => Ok(input.clone()),
            }
        }

        fn registry(&self) -> &ModuleRegistry {
            &self.registry
        }
    }

    struct Tree {
        registry: ModuleRegistry,
    }

    impl Tree {
        fn new() -> Self {
            let mut registry = ModuleRegistry::new();
            registry.register_parameter("scale", Parameter::from_data(2.0));
            registry.register_module("left", Leaf::new());
            registry.register_module("right", Leaf::new());
            Tree { registry }
        }
    }

    impl Module for Tree {
        fn forward(&self, input: &Tensor) -> Result<Tensor> {
            Ok(input.clone())
        }

        fn registry(&self) -> &ModuleRegistry {
            &self.registry
        }
    }

    #[test]
    fn test_named_parameters_are_dotted_and_ordered() {
        let tree = Tree::new();
        let names: Vec<String> = tree.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["scale", "left.w", "left.b", "right.w", "right.b"]);
        assert_eq!(tree.parameters().len(), 5);
    }

    #[test]
    fn test_named_modules_excludes_root() {
        let tree = Tree::new();
        let names: Vec<String> = tree.named_modules().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["left", "right"]);
    }

    #[test]
    fn test_reregistration_keeps_position() {
        let mut registry = ModuleRegistry::new();
        registry.register_parameter("a", Parameter::from_data(1.0));
        registry.register_parameter("b", Parameter::from_data(2.0));
        registry.register_parameter("a", Parameter::from_data(3.0));
        let entries: Vec<(&str, f64)> = registry
            .local_parameters()
            .map(|(n, p)| (n, p.item().unwrap()))
            .collect();
        assert_eq!(entries, vec![("a", 3.0), ("b", 2.0)]);
    }

    #[test]
    fn test_zero_grad_cascades() {
        let tree = Tree::new();
        let x = Tensor::new([1.0, 1.0], false);
        for (_, child) in tree.registry().children() {
            child.forward(&x).unwrap().sum(None, false).unwrap().backward(None).unwrap();
        }
        assert!(tree.parameters().iter().any(|p| p.grad().is_some()));

        tree.zero_grad();
        assert!(tree.parameters().iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_tied_parameter_listed_once() {
        use crate::optim::{Optimizer, Sgd, SgdConfig};

        let shared = Parameter::from_data(1.0);
        let mut registry = ModuleRegistry::new();
        registry.register_parameter("a", shared.clone());
        registry.register_parameter("b", shared.clone());
        let tied = Tree { registry };

        let named = tied.named_parameters();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].0, "a");

        let mut opt = Sgd::new(tied.parameters(), SgdConfig::new(0.1)).unwrap();
        shared.tensor().backward(Some(&Tensor::scalar(1.0))).unwrap();
        opt.step().unwrap();
        assert!((shared.item().unwrap() - 0.9).abs() < 1e-12);
    }
}
