use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use core::time::Duration;
use redraw_core::{CommandGenerator, RetryPolicy, claim, naming, watcher};
use std::path::PathBuf;

/// Runtime configuration for the `redraw-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file in the working directory is honoured). Defaults match a single
/// local generator that needs up to a minute per image.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "redraw-server",
    version,
    about = "Turns an uploaded sketch and a prompt into a generated image"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:5000"))]
    pub server_addr: String,

    /// Base directory holding `input/images` and `output/images`. Defaults to
    /// the current working directory.
    ///
    /// Environment variable: `BASE_DIR`
    #[arg(long, env = "BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// External program that runs the generation workflow.
    ///
    /// It is invoked as `<cmd> [args...] <output_dir> <prompt> <input_image>
    /// <seed>` and must eventually write `<output_dir>/<pending_name>`.
    ///
    /// Environment variable: `GENERATOR_CMD`
    #[arg(long, env = "GENERATOR_CMD")]
    pub generator_cmd: String,

    /// Extra leading arguments for the generator (repeatable, or comma
    /// separated in the environment).
    ///
    /// Environment variable: `GENERATOR_ARGS`
    #[arg(
        long = "generator-arg",
        env = "GENERATOR_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    pub generator_args: Vec<String>,

    /// Kill the generator if it runs longer than this many seconds. `0`
    /// disables the limit.
    ///
    /// Environment variable: `GENERATOR_TIMEOUT_SECS`
    #[arg(long, env = "GENERATOR_TIMEOUT_SECS", default_value_t = 0)]
    pub generator_timeout_secs: u64,

    /// Fixed file name the generator writes inside the output directory.
    ///
    /// Environment variable: `PENDING_NAME`
    #[arg(long, env = "PENDING_NAME", default_value_t = String::from("image.png"))]
    pub pending_name: String,

    /// Interval between readiness probes of the pending output.
    ///
    /// Environment variable: `POLL_INTERVAL_MS`
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = watcher::DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// How long to wait for the pending output before reporting a timeout.
    ///
    /// Environment variable: `WAIT_TIMEOUT_SECS`
    #[arg(long, env = "WAIT_TIMEOUT_SECS", default_value_t = watcher::DEFAULT_TIMEOUT.as_secs())]
    pub wait_timeout_secs: u64,

    /// Rename attempts before the output is reported as busy.
    ///
    /// Environment variable: `CLAIM_ATTEMPTS`
    #[arg(long, env = "CLAIM_ATTEMPTS", default_value_t = claim::DEFAULT_ATTEMPTS)]
    pub claim_attempts: u32,

    /// Delay between rename attempts.
    ///
    /// Environment variable: `CLAIM_DELAY_MS`
    #[arg(long, env = "CLAIM_DELAY_MS", default_value_t = claim::DEFAULT_DELAY.as_millis() as u64)]
    pub claim_delay_ms: u64,

    /// Largest accepted upload request body, in bytes.
    ///
    /// Environment variable: `MAX_UPLOAD_BYTES`
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl GeneratorConfig {
    pub fn build(&self) -> CommandGenerator {
        CommandGenerator::new(&self.program)
            .with_args(&self.args)
            .with_timeout(self.timeout)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pending_name: String,
    pub generator: GeneratorConfig,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub claim_policy: RetryPolicy,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Lays out `input/images` and `output/images` under `base_dir` and fills
    /// every other setting with its default.
    pub fn with_base_dir(base_dir: PathBuf, generator: GeneratorConfig) -> Self {
        Self {
            server_addr: String::from("0.0.0.0:5000"),
            input_dir: base_dir.join("input").join("images"),
            output_dir: base_dir.join("output").join("images"),
            pending_name: String::from("image.png"),
            generator,
            poll_interval: watcher::DEFAULT_POLL_INTERVAL,
            wait_timeout: watcher::DEFAULT_TIMEOUT,
            claim_policy: RetryPolicy::attempts(claim::DEFAULT_ATTEMPTS, claim::DEFAULT_DELAY),
            max_upload_bytes: 32 * 1024 * 1024,
            log_format: LogFormat::Pretty,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.generator_cmd.trim().is_empty() {
            bail!("GENERATOR_CMD must not be empty");
        }

        if args.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than 0");
        }

        if args.claim_attempts == 0 {
            bail!("CLAIM_ATTEMPTS must be greater than 0");
        }

        if !naming::is_plain_file_name(&args.pending_name) {
            bail!(
                "PENDING_NAME ({:?}) must be a plain file name",
                args.pending_name
            );
        }

        let cwd = std::env::current_dir().context("cannot resolve working directory")?;
        let base_dir = match args.base_dir {
            Some(dir) => std::path::absolute(&dir)
                .with_context(|| format!("cannot resolve BASE_DIR {}", dir.display()))?,
            None => cwd,
        };

        let generator = GeneratorConfig {
            program: args.generator_cmd,
            args: args.generator_args,
            timeout: (args.generator_timeout_secs > 0)
                .then(|| Duration::from_secs(args.generator_timeout_secs)),
        };

        Ok(Self {
            server_addr: args.server_addr,
            pending_name: args.pending_name,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            wait_timeout: Duration::from_secs(args.wait_timeout_secs),
            claim_policy: RetryPolicy::attempts(
                args.claim_attempts,
                Duration::from_millis(args.claim_delay_ms),
            ),
            max_upload_bytes: args.max_upload_bytes,
            log_format: args.log_format,
            ..Self::with_base_dir(base_dir, generator)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["redraw-server", "--generator-cmd", "python3"];
        argv.extend_from_slice(extra);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_follow_the_reference_deployment() {
        let config = parse(&["--base-dir", "/srv/redraw"]).unwrap();

        assert_eq!(config.input_dir, PathBuf::from("/srv/redraw/input/images"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/redraw/output/images"));
        assert_eq!(config.pending_name, "image.png");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.wait_timeout, Duration::from_secs(60));
        assert_eq!(
            config.claim_policy,
            RetryPolicy::attempts(5, Duration::from_secs(1))
        );
        assert_eq!(config.generator.timeout, None);
    }

    #[test]
    fn generator_args_accept_hyphenated_values() {
        let config = parse(&[
            "--generator-arg",
            "-u",
            "--generator-arg",
            "lineart.py",
            "--generator-timeout-secs",
            "90",
        ])
        .unwrap();

        assert_eq!(config.generator.args, vec!["-u", "lineart.py"]);
        assert_eq!(config.generator.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(parse(&["--claim-attempts", "0"]).is_err());
        assert!(parse(&["--poll-interval-ms", "0"]).is_err());
        assert!(parse(&["--pending-name", "../image.png"]).is_err());
        assert!(CliArgs::try_parse_from(["redraw-server"]).is_err());
    }
}
