//! # Algorithm Registries
//!
//! Type-name to factory maps, populated once at startup and passed to
//! `ShardingRule::from_config` explicitly.

use super::builtin::{
    BoundaryRangeShardingAlgorithm, HashModShardingAlgorithm, InlineShardingAlgorithm,
    ModShardingAlgorithm, Props, VolumeRangeShardingAlgorithm,
};
use super::key_generator::{
    SnowflakeKeyGenerator, SystemTimeSource, UuidKeyGenerator, DEFAULT_MAX_TOLERATE_MILLIS,
    MAX_WORKER_ID,
};
use crate::domain::{ConfigError, KeyGenerator, ShardingAlgorithm, TimeSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a sharding algorithm from its properties.
pub type AlgorithmFactory = fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError>;

/// Sharding algorithms by type name.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with MOD, HASH_MOD, INLINE, VOLUME_RANGE and BOUNDARY_RANGE.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ModShardingAlgorithm::TYPE, ModShardingAlgorithm::create);
        registry.register(HashModShardingAlgorithm::TYPE, HashModShardingAlgorithm::create);
        registry.register(InlineShardingAlgorithm::TYPE, InlineShardingAlgorithm::create);
        registry.register(
            VolumeRangeShardingAlgorithm::TYPE,
            VolumeRangeShardingAlgorithm::create,
        );
        registry.register(
            BoundaryRangeShardingAlgorithm::TYPE,
            BoundaryRangeShardingAlgorithm::create,
        );
        registry
    }

    /// Add or replace a factory. Type names are case-insensitive.
    pub fn register(&mut self, type_name: &str, factory: AlgorithmFactory) {
        self.factories.insert(type_name.to_ascii_uppercase(), factory);
    }

    /// Is `type_name` registered?
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(&type_name.to_ascii_uppercase())
    }

    /// Instantiate an algorithm.
    pub fn create(
        &self,
        type_name: &str,
        props: &Props,
    ) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        let factory = self
            .factories
            .get(&type_name.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownAlgorithmType(type_name.to_string()))?;
        debug!(algorithm = %type_name, "Creating sharding algorithm");
        factory(props)
    }
}

/// Process-level inputs shared by every key generator.
#[derive(Debug, Clone)]
pub struct KeyGeneratorEnv {
    /// Clock for time-based generators.
    pub time_source: Arc<dyn TimeSource>,
    /// Default Snowflake worker id.
    pub worker_id: u16,
}

impl Default for KeyGeneratorEnv {
    fn default() -> Self {
        Self {
            time_source: Arc::new(SystemTimeSource),
            worker_id: 0,
        }
    }
}

/// Builds a key generator from the environment and its properties.
pub type KeyGeneratorFactory =
    fn(&KeyGeneratorEnv, &Props) -> Result<Arc<dyn KeyGenerator>, ConfigError>;

fn snowflake(env: &KeyGeneratorEnv, props: &Props) -> Result<Arc<dyn KeyGenerator>, ConfigError> {
    let parse = |key: &str, default: u64| -> Result<u64, ConfigError> {
        props.get(key).map_or(Ok(default), |raw| {
            raw.trim().parse().map_err(|_| ConfigError::InvalidProperty {
                algorithm: SnowflakeKeyGenerator::TYPE.to_string(),
                property: key.to_string(),
                reason: format!("'{raw}' is not an unsigned integer"),
            })
        })
    };
    let worker_id = parse("worker-id", u64::from(env.worker_id))?;
    if worker_id > u64::from(MAX_WORKER_ID) {
        return Err(ConfigError::InvalidProperty {
            algorithm: SnowflakeKeyGenerator::TYPE.to_string(),
            property: "worker-id".to_string(),
            reason: format!("must be at most {MAX_WORKER_ID}"),
        });
    }
    let tolerate = parse(
        "max-tolerate-time-difference-milliseconds",
        DEFAULT_MAX_TOLERATE_MILLIS,
    )?;
    Ok(Arc::new(SnowflakeKeyGenerator::new(
        env.time_source.clone(),
        worker_id as u16,
        tolerate,
    )))
}

fn uuid(_env: &KeyGeneratorEnv, _props: &Props) -> Result<Arc<dyn KeyGenerator>, ConfigError> {
    Ok(Arc::new(UuidKeyGenerator))
}

/// Key generators by type name.
#[derive(Clone)]
pub struct KeyGeneratorRegistry {
    env: KeyGeneratorEnv,
    factories: HashMap<String, KeyGeneratorFactory>,
}

impl KeyGeneratorRegistry {
    /// Empty registry.
    pub fn new(env: KeyGeneratorEnv) -> Self {
        Self {
            env,
            factories: HashMap::new(),
        }
    }

    /// Registry with SNOWFLAKE and UUID.
    pub fn with_builtins(env: KeyGeneratorEnv) -> Self {
        let mut registry = Self::new(env);
        registry.register(SnowflakeKeyGenerator::TYPE, snowflake);
        registry.register(UuidKeyGenerator::TYPE, uuid);
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, type_name: &str, factory: KeyGeneratorFactory) {
        self.factories.insert(type_name.to_ascii_uppercase(), factory);
    }

    /// Instantiate a generator.
    pub fn create(
        &self,
        type_name: &str,
        props: &Props,
    ) -> Result<Arc<dyn KeyGenerator>, ConfigError> {
        let factory = self
            .factories
            .get(&type_name.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownKeyGenerator(type_name.to_string()))?;
        factory(&self.env, props)
    }
}

impl Default for KeyGeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins(KeyGeneratorEnv::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_algorithms_registered() {
        let registry = AlgorithmRegistry::with_builtins();
        for name in ["MOD", "hash_mod", "INLINE", "VOLUME_RANGE", "BOUNDARY_RANGE"] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert!(!registry.contains("CRC32"));
    }

    #[test]
    fn test_unknown_algorithm_type() {
        let registry = AlgorithmRegistry::with_builtins();
        let err = registry.create("CRC32", &Props::new()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownAlgorithmType("CRC32".into()));
        let err = registry.create("INTERVAL", &Props::new()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownAlgorithmType("INTERVAL".into()));
    }

    #[test]
    fn test_custom_algorithm_registration() {
        let mut registry = AlgorithmRegistry::new();
        registry.register("my_mod", ModShardingAlgorithm::create);
        let mut props = Props::new();
        props.insert("sharding-count".into(), "2".into());
        let algo = registry.create("MY_MOD", &props).unwrap();
        assert_eq!(algo.type_name(), "MOD");
    }

    #[test]
    fn test_key_generators() {
        let registry = KeyGeneratorRegistry::default();
        let snowflake = registry.create("snowflake", &Props::new()).unwrap();
        assert_eq!(snowflake.type_name(), "SNOWFLAKE");
        assert!(registry.create("UUID", &Props::new()).is_ok());
        assert!(matches!(
            registry.create("AUTO_INCREMENT", &Props::new()),
            Err(ConfigError::UnknownKeyGenerator(_))
        ));

        let mut props = Props::new();
        props.insert("worker-id".into(), "5000".into());
        assert!(registry.create("SNOWFLAKE", &props).is_err());
    }
}
