// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
    thread,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Scheduler options.
mod scheduler_config {
    pub const SECTION_NAME: &str = "scheduler";
    // Number of worker threads.
    pub const WORKER_THREADS: &str = "worker_threads";
    // Stack size of every coroutine, in bytes.
    pub const STACK_SIZE: &str = "stack_size";
}

// Logging options.
mod logging_config {
    pub const SECTION_NAME: &str = "logging";
    // Log specification used when RUST_LOG is not set.
    pub const LEVEL: &str = "level";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml(&config_s)
    }

    /// Parses a configuration held in a string.
    pub fn from_yaml(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("failed to parse configuration ({})", e);
                error!("from_yaml(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }

    /// Scheduler config: Reads the number of worker threads from the environment variable first, then the underlying
    /// configuration. Falls back to the number of available CPUs when neither sets it.
    pub fn worker_threads(&self) -> Result<usize, Fail> {
        let worker_threads: usize = if let Some(n) = Self::get_typed_env_option(scheduler_config::WORKER_THREADS)? {
            n
        } else {
            match self.get_scheduler_config() {
                Ok(section) if !section.index(scheduler_config::WORKER_THREADS).is_badvalue() => {
                    Self::get_int_option(section, scheduler_config::WORKER_THREADS)?
                },
                _ => default_worker_threads(),
            }
        };

        if worker_threads == 0 {
            let cause: String = "at least one worker thread is required".to_string();
            error!("worker_threads(): {:?}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(worker_threads)
    }

    /// Scheduler config: Reads the coroutine stack size from the environment variable first, then the underlying
    /// configuration.
    pub fn stack_size(&self) -> Result<usize, Fail> {
        let stack_size: usize = if let Some(size) = Self::get_typed_env_option(scheduler_config::STACK_SIZE)? {
            size
        } else {
            match self.get_scheduler_config() {
                Ok(section) if !section.index(scheduler_config::STACK_SIZE).is_badvalue() => {
                    Self::get_int_option(section, scheduler_config::STACK_SIZE)?
                },
                _ => limits::DEFAULT_STACK_SIZE,
            }
        };

        if stack_size < limits::MIN_STACK_SIZE {
            let cause: String = format!("stack size must be at least {} bytes", limits::MIN_STACK_SIZE);
            error!("stack_size(): {:?}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(stack_size)
    }

    /// Logging config: log specification to use when `RUST_LOG` is unset, if any.
    pub fn log_level(&self) -> Result<Option<String>, Fail> {
        let section: &Yaml = match Self::get_subsection(&self.0, logging_config::SECTION_NAME) {
            Ok(section) => section,
            Err(_) => return Ok(None),
        };
        if section.index(logging_config::LEVEL).is_badvalue() {
            return Ok(None);
        }
        let level: String = Self::get_typed_str_option(section, logging_config::LEVEL, |val: &str| {
            Some(val.to_string())
        })?;
        Ok(Some(level))
    }

    fn get_scheduler_config(&self) -> Result<&Yaml, Fail> {
        Self::get_subsection(&self.0, scheduler_config::SECTION_NAME)
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Similar to `require_typed_option` using `Yaml::as_hash` receiver. This method returns a `&Yaml` instead of
    /// yaml::Hash, and Yaml is more natural for indexing.
    fn get_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = Self::get_option(yaml, index)?;
        match section {
            Yaml::Hash(_) => Ok(section),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find the value at `index`, validating that the index exists.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that it exists and that the receiver returns Some(_).
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find value at `index`, validating it as a string.
    fn get_typed_str_option<T, Fn>(yaml: &Yaml, index: &str, parser: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&str) -> Option<T>,
    {
        let option: &Yaml = Self::get_option(yaml, index)?;
        if let Some(value) = option.as_str() {
            if let Some(value) = parser(value) {
                return Ok(value);
            }
        }
        let message: String = format!("parameter {} has unexpected type", index);
        Err(Fail::new(libc::EINVAL, message.as_str()))
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        // Check for the environment variable.
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `require_typed_option` using `Yaml::as_i64` as the receiver, but additionally verifies that the
    /// destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// An empty configuration: every option takes its environment override or its default.
impl Default for Config {
    fn default() -> Self {
        Self(Yaml::Hash(Default::default()))
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// One worker per available CPU.
pub(crate) fn default_worker_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
