//! Configuration

use std::collections::HashMap;
use std::{cmp, env, fmt, io, str};

/// A `Config` holds simple key/value pairings that are sourced
/// from a few layers, and provides methods to extract values.
///
/// It is intended to only be used while bootstrapping a timer,
/// allowing developers to specify values at a few different layers.
///
/// Configuration values are layered, where by the environment
/// variables take highest precedence, followed by the application's
/// specified defaults (if any), followed by the library's fallback
/// defaults.
#[derive(Clone, Debug, Default)]
pub struct Config {
    defaults: HashMap<String, String>,
}

impl Config {
    /// Create a new configuration with the specified defaults. These
    /// defaults are used for extracting configuration values if they
    /// are not defined in the environment.
    pub fn new(defaults: &[(&str, &str)]) -> Config {
        Config {
            defaults: defaults
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Create a new configuration with the specified fallback defaults. That is,
    /// they only take effect if not defined by the environment or already supplied
    /// defaults.
    pub fn with_fallback(&self, fallback_defaults: &[(&str, &str)]) -> Config {
        let mut cfg = self.clone();

        for (key, value) in Self::new(fallback_defaults).defaults.into_iter() {
            cfg.defaults.entry(key).or_insert(value);
        }

        cfg
    }

    pub fn parsed<T: str::FromStr>(&self, name: &str) -> io::Result<T>
    where
        T::Err: fmt::Display,
    {
        self.string(name).and_then(|value| parse(name, &value))
    }

    pub fn parsed_vec<T: str::FromStr>(&self, name: &str) -> io::Result<Vec<T>>
    where
        T::Err: fmt::Display,
    {
        self.string_vec(name)
            .and_then(|values| values.iter().map(|v| parse(name, v)).collect())
    }

    /// A comma separated list. Commas and backslashes can be escaped with
    /// a backslash.
    pub fn string_vec(&self, name: &str) -> io::Result<Vec<String>> {
        self.string(name).map(|value| {
            let mut arg = String::new();
            let mut args = Vec::new();
            let mut escaped = false;

            for c in value.chars() {
                if escaped {
                    escaped = false;
                    arg.push(c);
                } else if c == '\\' {
                    escaped = true;
                } else if c == ',' {
                    args.push(arg);
                    arg = String::new();
                } else {
                    arg.push(c);
                }
            }

            if !value.is_empty() {
                args.push(arg);
            }

            args
        })
    }

    pub fn string(&self, name: &str) -> io::Result<String> {
        env::var(name)
            .ok()
            .or_else(|| self.defaults.get(name).cloned())
            .ok_or_else(|| config_error(format!("config missing: {}", name)))
    }
}

fn parse<T: str::FromStr>(name: &str, value: &str) -> io::Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| config_error(format!("config parse error: {} {}", name, e)))
}

fn config_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message)
}

/// The executor a timer built from configuration fires its tasks on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorKind {
    WorkStealing,
    SingleThreaded,
    Inline,
}

impl str::FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work-stealing" => Ok(ExecutorKind::WorkStealing),
            "single-threaded" => Ok(ExecutorKind::SingleThreaded),
            "inline" => Ok(ExecutorKind::Inline),
            other => Err(format!("unknown executor: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TimerConfig {
    pub default_executor: ExecutorKind,
    pub work_stealing_parallelism_min: usize,
    pub work_stealing_parallelism_max: usize,
    pub work_stealing_parallelism_factor: f32,
    pub work_stealing_task_queue_fifo: bool,
    pub num_cpus: usize,

    /// Timer threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,

    /// Install the crate's stderr logger. Has no effect if another
    /// logger has already been installed.
    pub install_logger: bool,

    pub log_config_on_start: bool,
}

impl TimerConfig {
    #[rustfmt::skip]
    pub fn new(cfg: &Config) -> io::Result<Self> {
        let cfg = cfg.with_fallback(&[
            ("PANTOMIME_TIMER_DEFAULT_EXECUTOR",                    "work-stealing"),
            ("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_MIN",       "2"),
            ("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_MAX",       "64"),
            ("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_FACTOR",    "1.0"),
            ("PANTOMIME_TIMER_WORK_STEALING_TASK_QUEUE_FIFO",       "true"),
            ("PANTOMIME_TIMER_NUM_CPUS",                            "0"),
            ("PANTOMIME_TIMER_THREAD_NAME_PREFIX",                  "pantomime-timer"),
            ("PANTOMIME_TIMER_INSTALL_LOGGER",                      "false"),
            ("PANTOMIME_TIMER_LOG_CONFIG_ON_START",                 "false"),
        ]);

        Ok(Self {
            default_executor:                   cfg.parsed("PANTOMIME_TIMER_DEFAULT_EXECUTOR")?,
            work_stealing_parallelism_min:      cfg.parsed("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_MIN")?,
            work_stealing_parallelism_max:      cfg.parsed("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_MAX")?,
            work_stealing_parallelism_factor:   cfg.parsed("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_FACTOR")?,
            work_stealing_task_queue_fifo:      cfg.parsed("PANTOMIME_TIMER_WORK_STEALING_TASK_QUEUE_FIFO")?,
            num_cpus:                           cfg.parsed("PANTOMIME_TIMER_NUM_CPUS")
                                                   .map(|n| if n == 0 { num_cpus::get() } else { n })?,
            thread_name_prefix:                 cfg.string("PANTOMIME_TIMER_THREAD_NAME_PREFIX")?,
            install_logger:                     cfg.parsed("PANTOMIME_TIMER_INSTALL_LOGGER")?,
            log_config_on_start:                cfg.parsed("PANTOMIME_TIMER_LOG_CONFIG_ON_START")?,
        })
    }

    /// threads = min(parallelism_max, max(parallelism_min, cpus * parallelism_factor))
    pub fn work_stealing_parallelism(&self) -> usize {
        cmp::min(
            self.work_stealing_parallelism_max,
            cmp::max(
                self.work_stealing_parallelism_min,
                (self.num_cpus as f32 * self.work_stealing_parallelism_factor) as usize,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, time};

    #[derive(Debug, PartialEq)]
    struct CustomConfig {
        latency: u64,
        time: time::Duration,
        words: Vec<String>,
        numbers: Vec<usize>,
    }

    #[test]
    fn test_config() -> io::Result<()> {
        let config = Config::new(&[("LATENCY", "10"), ("TIME", "1")]).with_fallback(&[
            (
                "WORDS",
                "one,two,three\\,with a comma,four with \\\\ a backslash",
            ),
            ("NUMBERS", "4, 5,6,77"),
            ("TIME", "2"),
        ]);

        let parsed_config = CustomConfig {
            latency: config.parsed("LATENCY")?,
            time: config.parsed("TIME").map(time::Duration::from_millis)?,
            words: config.string_vec("WORDS")?,
            numbers: config.parsed_vec("NUMBERS")?,
        };

        assert_eq!(
            parsed_config,
            CustomConfig {
                latency: 10,
                time: time::Duration::from_millis(1),
                words: vec![
                    "one".to_string(),
                    "two".to_string(),
                    "three,with a comma".to_string(),
                    "four with \\ a backslash".to_string()
                ],
                numbers: vec![4, 5, 6, 77]
            }
        );

        Ok(())
    }

    #[test]
    fn test_missing_and_malformed() {
        let config = Config::new(&[("NOT_A_NUMBER", "ten")]);

        assert!(config.string("PANTOMIME_TIMER_TEST_MISSING_KEY").is_err());
        assert!(config.parsed::<u64>("NOT_A_NUMBER").is_err());
    }

    #[test]
    fn test_timer_config() -> io::Result<()> {
        let config = TimerConfig::new(&Config::default())?;

        assert_eq!(config.default_executor, ExecutorKind::WorkStealing);
        assert!(config.num_cpus > 0);
        assert!(config.work_stealing_parallelism() >= 2);
        assert!(config.work_stealing_parallelism() <= 64);

        Ok(())
    }

    #[test]
    fn test_timer_config_overrides() -> io::Result<()> {
        let config = TimerConfig::new(&Config::new(&[
            ("PANTOMIME_TIMER_DEFAULT_EXECUTOR", "single-threaded"),
            ("PANTOMIME_TIMER_NUM_CPUS", "100"),
            ("PANTOMIME_TIMER_WORK_STEALING_PARALLELISM_FACTOR", "0.5"),
        ]))?;

        assert_eq!(config.default_executor, ExecutorKind::SingleThreaded);
        assert_eq!(config.work_stealing_parallelism(), 50);

        Ok(())
    }

    #[test]
    fn test_unknown_executor() {
        let config = Config::new(&[("PANTOMIME_TIMER_DEFAULT_EXECUTOR", "fibers")]);

        assert!(TimerConfig::new(&config).is_err());
    }
}
