//! Registry mapping `(name, device)` pairs to function factories.

use std::collections::HashMap;
use std::sync::OnceLock;

use tessera_tensor::DeviceKind;

use crate::{
    backend::CpuBackend,
    config::FuncConfig,
    conv::{GemmConvFunction, GEMM_CONV},
    error::{OpError, RegistryError},
    function::Function,
    prelu::{PreluFunction, PreluGradFunction, PRELU, PRELU_GRAD},
    softmax_cross_entropy::{
        SoftmaxWithCrossEntropyFunction, SoftmaxWithCrossEntropyGradFunction,
        SOFTMAX_WITH_CROSS_ENTROPY, SOFTMAX_WITH_CROSS_ENTROPY_GRAD,
    },
};

/// Builds an uninitialized function.
pub type FunctionFactory = fn() -> Box<dyn Function>;

fn boxed<F: Function + Default + 'static>() -> Box<dyn Function> {
    Box::<F>::default()
}

/// Explicit map from `(name, device family)` to a function factory.
///
/// Devices are keyed by [`DeviceKind`], so one registration serves every ordinal of a
/// device family.
///
/// # Example
///
/// ```
/// use tessera_ops::{FuncConfig, FunctionRegistry};
/// use tessera_tensor::Device;
///
/// let registry = FunctionRegistry::with_builtin();
/// let config = FuncConfig::new()
///     .set("strides", [1, 1])
///     .set("paddings", [0, 0])
///     .set("groups", 1usize);
///
/// let conv = registry.create("GemmConv", Device::Cpu, &config).unwrap();
/// assert_eq!(conv.num_inputs(), 2);
/// assert!(registry.create("GemmConv", Device::cuda(0), &config).is_err());
/// ```
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    factories: HashMap<(String, DeviceKind), FunctionFactory>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in CPU functions.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let cpu = DeviceKind::Cpu;
        registry.insert(GEMM_CONV, cpu, boxed::<GemmConvFunction<CpuBackend>>);
        registry.insert(PRELU, cpu, boxed::<PreluFunction>);
        registry.insert(PRELU_GRAD, cpu, boxed::<PreluGradFunction>);
        registry.insert(
            SOFTMAX_WITH_CROSS_ENTROPY,
            cpu,
            boxed::<SoftmaxWithCrossEntropyFunction>,
        );
        registry.insert(
            SOFTMAX_WITH_CROSS_ENTROPY_GRAD,
            cpu,
            boxed::<SoftmaxWithCrossEntropyGradFunction>,
        );
        log::debug!("registered {} built-in functions", registry.len());
        registry
    }

    fn insert(&mut self, name: &str, device: DeviceKind, factory: FunctionFactory) {
        self.factories.insert((name.to_string(), device), factory);
    }

    /// Registers `factory` under `(name, device)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the key is taken; the existing entry is kept.
    pub fn register(
        &mut self,
        name: &str,
        device: impl Into<DeviceKind>,
        factory: FunctionFactory,
    ) -> Result<(), RegistryError> {
        let key = (name.to_string(), device.into());
        if self.factories.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                name: key.0,
                device: key.1,
            });
        }
        log::debug!("registering function `{}` for {}", key.0, key.1);
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Returns true if a function is registered under `(name, device)`.
    pub fn contains(&self, name: &str, device: impl Into<DeviceKind>) -> bool {
        self.factories.contains_key(&(name.to_string(), device.into()))
    }

    /// Builds the function registered under `(name, device)` and initializes it with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown key, or the error raised by
    /// [`Function::init`].
    pub fn create(
        &self,
        name: &str,
        device: impl Into<DeviceKind>,
        config: &FuncConfig,
    ) -> Result<Box<dyn Function>, OpError> {
        let device = device.into();
        let Some(factory) = self.factories.get(&(name.to_string(), device)) else {
            if self.factories.keys().any(|(n, _)| n == name) {
                log::warn!("function `{name}` has no implementation for {device}");
            }
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                device,
            }
            .into());
        };

        let mut function = factory();
        function.init(config)?;
        log::debug!("created function `{name}` for {device}");
        Ok(function)
    }

    /// Registered keys, sorted by name then device.
    pub fn keys(&self) -> Vec<(&str, DeviceKind)> {
        let mut keys: Vec<_> = self
            .factories
            .keys()
            .map(|(name, device)| (name.as_str(), *device))
            .collect();
        keys.sort();
        keys
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Process-wide registry holding the built-in functions.
///
/// Built on first use and read-only afterwards. Callers that register their own functions
/// keep a [`FunctionRegistry`] of their own.
pub fn global() -> &'static FunctionRegistry {
    static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(FunctionRegistry::with_builtin)
}
