//! treebridge-bind: binds a framework plugin to one or more module plugins.
//!
//! Resolves the framework and module names to their shared libraries, invokes
//! their constructors, registers each module with the framework under its
//! name, then invokes the framework with the residual arguments.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use treebridge::logging::{self, LoggingConfig};
use treebridge::plugin::PluginLoader;

/// Bind a treegraph framework to analysis modules.
#[derive(Parser)]
#[command(name = "treebridge-bind")]
#[command(about = "Bind a treegraph framework plugin to module plugins")]
struct Cli {
    /// Framework name to load (libtreebridge_framework_<name>)
    #[arg(long)]
    framework: String,

    /// Module name to load (libtreebridge_module_<name>); repeatable
    #[arg(long = "module", required = true)]
    modules: Vec<String>,

    /// Additional plugin search directory; repeatable, searched first
    #[arg(long = "plugin-dir")]
    plugin_dirs: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Residual arguments passed to the framework unchanged
    #[arg(trailing_var_arg = true)]
    rest: Vec<String>,
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    // CLI dirs take precedence over TREEBRIDGE_PLUGIN_PATH, then cwd.
    let mut search = cli.plugin_dirs;
    if let Ok(raw) = std::env::var("TREEBRIDGE_PLUGIN_PATH") {
        search.extend(raw.split(':').map(PathBuf::from));
    }
    search.push(PathBuf::from("."));
    let loader = PluginLoader::new(search);

    let mut framework = loader
        .load_framework(&cli.framework)
        .with_context(|| format!("loading framework '{}'", cli.framework))?;

    // Module instances and their libraries must outlive the framework run.
    let mut loaded = Vec::with_capacity(cli.modules.len());
    for name in &cli.modules {
        let module = loader
            .load_module(name)
            .with_context(|| format!("loading module '{}'", name))?;
        let (instance, library) = module.into_parts();
        framework
            .framework_mut()
            .register_module(name, instance)
            .with_context(|| format!("registering module '{}'", name))?;
        loaded.push(library);
    }

    let code = framework
        .framework_mut()
        .invoke(&cli.rest)
        .context("framework invocation failed")?;
    drop(loaded);
    Ok(code)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&LoggingConfig {
        level: cli.log_level.clone(),
        color: true,
    }) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
