mod config;
mod state;
mod model;
mod sources;
mod matcher;
mod ui;
mod executor;
mod fieldcode;

use anyhow::Result;
use calloop::EventLoop;
use calloop_wayland_source::WaylandSource;
use smithay_client_toolkit::{
    shell::wlr_layer::{Layer, KeyboardInteractivity, Anchor},
    shell::WaylandSurface,
};
use wayland_client::{Connection, globals::registry_queue_init};
use crate::config::{load_config, Config};
use crate::executor::{ExecutionRequest, Executor};
use crate::model::DesktopEntry;
use crate::state::AppState;
use crate::ui::wayland::WaylandApp;
use crate::ui::render::Renderer;
use crate::sources::{Source, desktop::DesktopSource};
use std::thread;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "A desktop program runner", long_about = None)]
struct Args {
    /// Launch the entry with this name directly instead of showing the list
    name: Option<String>,

    /// Print the discovered entries and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config()?;

    if args.list {
        for entry in discover(&config)? {
            println!(
                "{}\t{}\t{}\t{}",
                entry.name,
                entry.exec,
                entry.icon.as_deref().unwrap_or("-"),
                entry.id
            );
        }
        return Ok(());
    }

    if let Some(name) = &args.name {
        launch_by_name(&config, name)?;
        return Ok(());
    }

    run_ui(config)
}

fn discover(config: &Config) -> Result<Vec<DesktopEntry>> {
    let mut state = AppState::new(config.clone());
    state.set_entries(DesktopSource::from_env().scan()?);
    Ok(state.filtered_indices.iter().map(|&i| state.entries[i].clone()).collect())
}

fn find_entry<'a>(entries: &'a [DesktopEntry], name: &str) -> Option<&'a DesktopEntry> {
    entries
        .iter()
        .find(|e| e.name == name)
        .or_else(|| entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
}

/// Placeholders are filled with the empty string; there is no prompt here.
fn launch_by_name(config: &Config, name: &str) -> Result<()> {
    let entries = discover(config)?;
    let Some(entry) = find_entry(&entries, name) else {
        eprintln!("bytestream: no desktop entry named '{}'", name);
        return Ok(());
    };

    log::debug!("Found '{}' in {}", entry.name, entry.id);
    let substitution = entry.needs_argument().then(String::new);
    let request = ExecutionRequest::for_entry(entry, substitution);
    let mut executor = Executor::new(config.general.terminal.as_deref());
    if let Err(e) = executor.resolve_and_run(request) {
        log::error!("Launching '{}' failed: {}", entry.name, e);
        eprintln!("bytestream: {}: {}", entry.name, e);
    }
    Ok(())
}

fn run_ui(config: Config) -> Result<()> {
    // 1. Setup Wayland Connection & Event Loop
    let mut event_loop: EventLoop<WaylandApp> = EventLoop::try_new()?;
    let conn = Connection::connect_to_env()?;
    let (globals, event_queue) = registry_queue_init::<WaylandApp>(&conn)?;
    let qh = event_queue.handle();

    // 2. Init State & UI
    let executor = Executor::new(config.general.terminal.as_deref());
    let app_state = AppState::new(config.clone());
    let mut app = WaylandApp::new(&globals, &qh, app_state, Renderer::new(), executor)?;

    // 3. Create Layer Surface
    let surface = app.compositor_state.create_surface(&qh);
    let layer_surface = app.layer_shell_state.create_layer_surface(
        &qh,
        surface,
        Layer::Overlay,
        Some("bytestream"),
        None,
    );

    layer_surface.set_anchor(Anchor::empty());
    layer_surface.set_size(config.theme.width, config.theme.height);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);
    layer_surface.commit();
    app.layer_surface = Some(layer_surface);

    // 4. Scan desktop entries off the event loop
    let (tx_entries, rx_entries) = calloop::channel::channel();
    thread::spawn(move || {
        let entries = match DesktopSource::from_env().scan() {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Desktop entry scan failed: {}", e);
                Vec::new()
            }
        };
        let _ = tx_entries.send(entries);
    });

    let conn_c = conn.clone();
    let qh_c = qh.clone();
    event_loop.handle().insert_source(rx_entries, move |event, _, app: &mut WaylandApp| {
        if let calloop::channel::Event::Msg(entries) = event {
            app.state.set_entries(entries);
            app.draw(&conn_c, &qh_c);
        }
    }).map_err(|e| anyhow::anyhow!("failed to watch entry loader: {}", e.error))?;

    WaylandSource::new(conn.clone(), event_queue)
        .insert(event_loop.handle())
        .map_err(|e| anyhow::anyhow!("failed to watch wayland connection: {}", e.error))?;

    // 5. Run Loop
    while !app.should_exit {
        event_loop.dispatch(None, &mut app)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_exact_then_case_insensitive() {
        let entries = vec![
            DesktopEntry::new("a".into(), "Files".into(), "nautilus".into(), false),
            DesktopEntry::new("b".into(), "files".into(), "thunar".into(), false),
        ];
        assert_eq!(find_entry(&entries, "files").unwrap().exec, "thunar");
        assert_eq!(find_entry(&entries, "FILES").unwrap().exec, "nautilus");
        assert!(find_entry(&entries, "editor").is_none());
    }

    #[test]
    fn parses_cli() {
        let args = Args::parse_from(["bytestream", "Firefox"]);
        assert_eq!(args.name.as_deref(), Some("Firefox"));
        assert!(!args.list);
        assert!(Args::parse_from(["bytestream", "--list"]).list);
    }
}
