//! midimap - Window-aware MIDI controller mapper.
//!
//! The command line doubles as the authoring surface: profiles and bindings
//! are edited here and `listen` runs the engine against a device.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use midimap::action::Binding;
use midimap::cli::{self, Cli, Commands, ProfileCommand};
use midimap::config::{expand_home, Settings};
use midimap::device::{MidiBackend, SystemMidi};
use midimap::dispatch::Dispatcher;
use midimap::error::{MapError, Result};
use midimap::listener::{Engine, Listener, ListenerEvent};
use midimap::logging::init_logging;
use midimap::midi::ControlType;
use midimap::profile::{describe_binding, resolve, LoadStatus, Profile, ProfileDocument, ProfileResolver};
use midimap::window::{FixedWindow, ForegroundWindowProvider, SystemWindow};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }

    pub fn features() -> Vec<&'static str> {
        let mut features = Vec::new();
        if cfg!(feature = "midi") {
            features.push("midi");
        }
        if cfg!(feature = "desktop") {
            features.push("desktop");
        }
        features
    }
}

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag or non-TTY
    if cli.no_color || !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    init_logging(cli.use_json(), cli.verbose, cli.quiet);

    // Run the command
    let result = run(&cli);

    // Handle errors
    if let Err(e) = result {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => {
            print_quick_start(cli);
            Ok(())
        }
        Some(Commands::Devices(args)) => cmd_devices(cli, args),
        Some(Commands::Listen(args)) => cmd_listen(cli, args),
        Some(Commands::Profiles) => cmd_profiles(cli),
        Some(Commands::Profile(command)) => match command {
            ProfileCommand::Add(args) => cmd_profile_add(cli, args),
            ProfileCommand::Remove(args) => cmd_profile_remove(cli, args),
            ProfileCommand::Show(args) => cmd_profile_show(cli, args),
            ProfileCommand::Match(args) => cmd_profile_match(cli, args),
        },
        Some(Commands::Bind(args)) => cmd_bind(cli, args),
        Some(Commands::Unbind(args)) => cmd_unbind(cli, args),
        Some(Commands::Resolve(args)) => cmd_resolve(cli, args),
        Some(Commands::Version) => {
            cmd_version(cli);
            Ok(())
        }
        Some(Commands::Completions(args)) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

/// Settings plus the profile document they point at.
struct App {
    settings: Settings,
    document: Arc<ProfileDocument>,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let mut settings = Settings::load(cli.config.as_deref())?;
        if let Some(path) = &cli.profiles {
            settings.profiles_path = expand_home(path)?.unwrap_or_else(|| path.clone());
        }
        debug!(profiles = %settings.profiles_path.display(), "Using profile document");
        let document = Arc::new(ProfileDocument::new(settings.profiles_path.clone()));
        Ok(Self { settings, document })
    }

    fn profiles_path(&self) -> PathBuf {
        self.settings.profiles_path.clone()
    }
}

// === Quick Start ===

fn print_quick_start(cli: &Cli) {
    if cli.use_json() {
        output_json(
            cli,
            &QuickStart {
                tool: "midimap",
                version: build_info::VERSION,
                description: "Window-aware MIDI controller mapper",
                devices: "midimap devices",
                listen: "midimap listen <DEVICE>",
                profiles: "midimap profiles",
                bind: "midimap bind <PROFILE> <key|cc|pitchwheel> <ID> <ACTION> [VALUE]",
                resolve: "midimap resolve <WINDOW_TITLE>",
                actions: ["none", "run-command", "keyboard-shortcut", "run-script", "print-message"],
            },
        );
        return;
    }

    println!(
        "{} {} - Window-aware MIDI controller mapper\n",
        "midimap".bold().cyan(),
        build_info::VERSION
    );
    println!("{}", "QUICK START".bold().underline());
    println!();
    println!("  {}  List MIDI inputs", "midimap devices".green());
    println!("  {}  Show profiles", "midimap profiles".green());
    println!(
        "  {}  Bind a key",
        "midimap bind default key 69 run-command \"start notepad\"".green()
    );
    println!(
        "  {}  Per-app profile",
        "midimap profile add chrome --window-match chrome".green()
    );
    println!("  {}  Run", "midimap listen \"<device>\"".green());
    println!();
    println!("{}", "ACTIONS".bold().underline());
    println!();
    println!("  none, run-command, keyboard-shortcut, run-script, print-message (or codes 0-4)");
    println!();
    println!("Run {} for full help", "midimap --help".yellow());
}

#[derive(Serialize)]
struct QuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    devices: &'static str,
    listen: &'static str,
    profiles: &'static str,
    bind: &'static str,
    resolve: &'static str,
    actions: [&'static str; 5],
}

// === Command Implementations ===

fn cmd_devices(cli: &Cli, args: &cli::DevicesArgs) -> Result<()> {
    let ports = SystemMidi.list_inputs()?;

    if cli.use_json() {
        output_json(cli, &ports);
    } else if ports.is_empty() {
        println!("{}", "No MIDI input devices found".yellow());
        if !cfg!(feature = "midi") {
            println!("This build has no MIDI support; rebuild with --features midi");
        }
    } else {
        for port in &ports {
            if args.long {
                println!("{}: {}", port.index.to_string().green(), port.name);
            } else {
                println!("{}", port.name);
            }
        }
    }
    Ok(())
}

fn cmd_listen(cli: &Cli, args: &cli::ListenArgs) -> Result<()> {
    let app = App::load(cli)?;
    // Create or repair the document up front so problems show before listening.
    app.document.load()?;

    let window: Arc<dyn ForegroundWindowProvider> = match args.window.as_deref() {
        Some(title) => Arc::new(FixedWindow::new(Some(title))),
        None => Arc::new(SystemWindow),
    };
    let engine = Arc::new(Engine::new(
        Arc::clone(&app.document),
        ProfileResolver::new(window),
        Dispatcher::system(&app.settings),
    ));

    let (tx, rx) = mpsc::channel();
    let mut listener = Listener::new(Arc::new(SystemMidi), engine, &app.settings).with_events(tx);
    listener.start(&args.device)?;

    let deadline = args
        .once_for
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let tick = Duration::from_millis(250);

    loop {
        let timeout = deadline.map_or(tick, |d| {
            d.saturating_duration_since(Instant::now()).min(tick)
        });
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                let finished = matches!(event, ListenerEvent::Stopped { .. });
                print_event(cli, &event);
                if finished {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    listener.stop()?;
    for event in rx.try_iter() {
        print_event(cli, &event);
    }
    Ok(())
}

fn print_event(cli: &Cli, event: &ListenerEvent) {
    if cli.use_json() {
        // One event per line
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    if cli.quiet {
        return;
    }
    match event {
        ListenerEvent::Started { device, .. } => {
            println!("{} {}", "Listening on".green(), device.bold());
        }
        ListenerEvent::Message { message, .. } => println!("{}", message.dimmed()),
        ListenerEvent::Dispatched { handled, .. } => {
            let outcome = handled.outcome.summary();
            let line = format!(
                "  [{}] {} {} -> {}",
                handled.profile, handled.control_type, handled.control_id, outcome
            );
            if handled.outcome.is_failure() {
                println!("{}", line.red());
            } else {
                println!("{}", line.cyan());
            }
        }
        ListenerEvent::Error { error, .. } => eprintln!("{}: {}", "Error".red().bold(), error),
        ListenerEvent::Stopped { device, .. } => println!("{} {}", "Stopped".yellow(), device),
    }
}

fn cmd_profiles(cli: &Cli) -> Result<()> {
    let app = App::load(cli)?;
    let (store, status) = app.document.load_with_status()?;

    if cli.use_json() {
        let profiles: Vec<_> = store
            .profiles()
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "window_match": p.window_match,
                    "file_path": p.file_path,
                    "bindings": p.binding_count(),
                })
            })
            .collect();
        output_json(
            cli,
            &serde_json::json!({
                "path": app.profiles_path().display().to_string(),
                "profiles": profiles,
            }),
        );
        return Ok(());
    }

    print_load_status(cli, &app, &status);
    for profile in store.profiles() {
        let matcher = if profile.window_match.is_empty() {
            "(fallback)".dimmed().to_string()
        } else {
            format!("matches \"{}\"", profile.window_match)
        };
        println!(
            "{}  {}  {} bindings",
            profile.name.green(),
            matcher,
            profile.binding_count()
        );
    }
    Ok(())
}

fn print_load_status(cli: &Cli, app: &App, status: &LoadStatus) {
    if cli.quiet {
        return;
    }
    let path = app.profiles_path();
    match status {
        LoadStatus::Loaded => {}
        LoadStatus::Created => {
            eprintln!("{}: created {}", "Note".yellow(), path.display());
        }
        LoadStatus::Repaired { reason } => {
            eprintln!(
                "{}: {} was unreadable ({reason}) and has been reset",
                "Warning".yellow().bold(),
                path.display()
            );
        }
        LoadStatus::DefaultAdded => {
            eprintln!("{}: added missing default profile", "Note".yellow());
        }
    }
}

fn cmd_profile_add(cli: &Cli, args: &cli::ProfileAddArgs) -> Result<()> {
    let app = App::load(cli)?;
    let profile = match (&args.from_exe, &args.name) {
        (Some(exe), name) => Profile::from_executable(name.as_deref(), exe)?,
        (None, Some(name)) => {
            Profile::new(name.clone(), args.window_match.clone().unwrap_or_else(|| name.clone()))
        }
        (None, None) => {
            return Err(MapError::ConfigInvalid(
                "a profile name or --from-exe is required".to_string(),
            ));
        }
    };
    let summary = profile_json(&profile);
    let name = profile.name.clone();
    let window_match = profile.window_match.clone();
    app.document.insert_profile(profile)?;

    if cli.use_json() {
        output_json(cli, &serde_json::json!({ "ok": true, "profile": summary }));
    } else if !cli.quiet {
        println!("Added profile {} (matches \"{}\")", name.green(), window_match);
    }
    Ok(())
}

fn cmd_profile_remove(cli: &Cli, args: &cli::ProfileNameArgs) -> Result<()> {
    let app = App::load(cli)?;
    let removed = app.document.remove_profile(&args.name)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "ok": true, "name": args.name, "removed": removed }),
        );
    } else if !cli.quiet {
        if removed {
            println!("Removed profile {}", args.name);
        } else {
            println!("Profile {} was not present", args.name);
        }
    }
    Ok(())
}

fn cmd_profile_show(cli: &Cli, args: &cli::ProfileNameArgs) -> Result<()> {
    let app = App::load(cli)?;
    let store = app.document.load()?;
    let profile = store.require(&args.name)?;

    if cli.use_json() {
        output_json(cli, &profile_json(profile));
        return Ok(());
    }

    println!("{}: {}", "Profile".bold(), profile.name);
    println!("{}: {}", "Window match".bold(), profile.window_match);
    if let Some(path) = &profile.file_path {
        println!("{}: {}", "Executable".bold(), path);
    }
    if profile.binding_count() == 0 {
        println!("{}", "No bindings".dimmed());
    }
    for (control_type, table) in &profile.bindings {
        println!();
        println!("{}", control_type.document_key().bold().underline());
        for (id, binding) in table {
            let wire = binding
                .cc_wire_id()
                .filter(|_| *control_type == ControlType::ControlChange)
                .map(|w| format!(" (cc {w})"))
                .unwrap_or_default();
            println!("  {:>4}{}  {}", id.green(), wire, describe_binding(binding));
        }
    }
    Ok(())
}

fn cmd_profile_match(cli: &Cli, args: &cli::ProfileMatchArgs) -> Result<()> {
    let app = App::load(cli)?;
    app.document.set_window_match(&args.name, &args.window_match)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "ok": true, "name": args.name, "window_match": args.window_match }),
        );
    } else if !cli.quiet {
        println!("Profile {} now matches \"{}\"", args.name.green(), args.window_match);
    }
    Ok(())
}

fn cmd_bind(cli: &Cli, args: &cli::BindArgs) -> Result<()> {
    if args.cc.is_some() && args.control != ControlType::ControlChange {
        return Err(MapError::ConfigInvalid(
            "--cc only applies to control-change bindings".to_string(),
        ));
    }
    let app = App::load(cli)?;

    let mut binding = args
        .value
        .as_ref()
        .map_or_else(|| Binding::new(args.action), |v| Binding::for_action(args.action, v.clone()));
    if let Some(wire) = args.cc {
        binding = binding.with_cc_wire_id(wire);
    }
    let described = describe_binding(&binding);
    let missing_value = args.action.param_key().is_some() && binding.value().is_none();

    let moved_from = app
        .document
        .set_binding(&args.profile, args.control, &args.id, binding.clone())?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "ok": true,
                "profile": args.profile,
                "control": args.control.document_key(),
                "id": args.id,
                "binding": binding,
                "cc_moved_from": moved_from,
            }),
        );
    } else if !cli.quiet {
        println!(
            "{} {} {} -> {}",
            args.profile.green(),
            args.control,
            args.id,
            described
        );
        if let (Some(wire), Some(slot)) = (args.cc, moved_from.as_deref()) {
            println!("  cc {wire} moved from slot {slot}, which now answers to its own number");
        }
        if missing_value {
            eprintln!(
                "{}: no value given; this binding will be reported as misconfigured when triggered",
                "Warning".yellow()
            );
        }
    }
    Ok(())
}

fn cmd_unbind(cli: &Cli, args: &cli::UnbindArgs) -> Result<()> {
    let app = App::load(cli)?;
    let removed = app
        .document
        .clear_binding(&args.profile, args.control, &args.id)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "ok": true, "removed": removed.is_some(), "binding": removed }),
        );
    } else if !cli.quiet {
        match removed {
            Some(b) => println!("Removed {} {} ({})", args.control, args.id, describe_binding(&b)),
            None => println!("{} {} was not bound", args.control, args.id),
        }
    }
    Ok(())
}

fn cmd_resolve(cli: &Cli, args: &cli::ResolveArgs) -> Result<()> {
    let app = App::load(cli)?;
    let store = app.document.load()?;
    let profile = resolve(&store, args.window.as_deref());

    let lookup = match (&args.control, &args.id) {
        (Some(control), Some(id)) => Some((*control, id.as_str(), profile.lookup(*control, id))),
        _ => None,
    };

    if cli.use_json() {
        let mut out = serde_json::json!({
            "window": args.window,
            "profile": profile.name,
        });
        if let Some((control, id, binding)) = &lookup {
            out["control"] = serde_json::json!(control.document_key());
            out["id"] = serde_json::json!(id);
            out["binding"] = serde_json::json!(binding);
        }
        output_json(cli, &out);
        return Ok(());
    }

    println!("{}", profile.name.green());
    if let Some((control, id, binding)) = lookup {
        match binding {
            Some(b) => println!("  {control} {id} -> {}", describe_binding(b)),
            None => println!("  {control} {id} -> {}", "unbound".dimmed()),
        }
    }
    Ok(())
}

fn cmd_version(cli: &Cli) {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
                "features": build_info::features(),
            }),
        );
    } else {
        println!("midimap {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
        println!("features: {}", build_info::features().join(", "));
    }
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "midimap", &mut io::stdout());
}

// === Utility Functions ===

fn profile_json(profile: &Profile) -> serde_json::Value {
    let bindings: serde_json::Map<String, serde_json::Value> = profile
        .bindings
        .iter()
        .map(|(ct, table)| (ct.document_key().to_string(), serde_json::json!(table)))
        .collect();
    serde_json::json!({
        "name": profile.name,
        "window_match": profile.window_match,
        "file_path": profile.file_path,
        "bindings": bindings,
    })
}

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

fn output_error(cli: &Cli, error: &MapError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json}");
    } else {
        eprintln!("{}: {}", "Error".red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", "Hint".yellow(), suggestion);
        }
    }
}
