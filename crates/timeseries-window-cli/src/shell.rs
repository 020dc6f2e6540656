use std::{path::PathBuf, sync::Arc};

use rustyline::{DefaultEditor, error::ReadlineError};
use snafu::ResultExt;
use timeseries_window_core::{
    clock::Clock,
    navigation::{EntityLoad, NavAction, NavOutcome, NavigationController},
    refresh::RefreshController,
    window::{TimeWindow, parse_flexible_datetime},
};
use tokio::runtime::Handle;

use crate::{
    error::{CliError, CliResult, InvalidWindowSnafu, SessionSnafu},
    report,
};

enum CommandAction {
    Continue,
    Break,
}

pub struct ShellContext {
    pub nav: NavigationController,
    pub clock: Arc<dyn Clock>,
    pub refresh: RefreshController,
}

fn print_help() {
    println!(
        r#"commands:
  back | b            pan back one small page
  fwd | f             pan forward one small page
  page-back | pb      pan back one window width
  page-fwd | pf       pan forward one window width
  earliest            jump to the first data
  latest              follow the current time
  jump <datetime>     end the window at e.g. 20250630T16:20
  duration <dur>      change the width, e.g. 3d, 2h30m
  window [<code>]     show or set the window in compact form
  refresh             pick up rows appended to the current month
  state               show the current window
  stats               show per-shard cache counters
  help
  exit | quit
"#
    );
}

pub(crate) fn parse_duration(text: &str) -> CliResult<chrono::Duration> {
    let window = TimeWindow::decode(Some(&format!("-{text}"))).context(InvalidWindowSnafu {
        input: text.to_string(),
    })?;
    Ok(window.duration())
}

impl ShellContext {
    fn print_loads(&self, loads: &[EntityLoad]) {
        let (start, end) = self.nav.state().window.resolve(self.clock.now());
        print!("{}", report::loads_text(start, end, loads));
    }

    fn print_state(&self) {
        println!("{}", report::state_text(&self.nav.state(), self.clock.now()));
    }

    async fn navigate(&self, action: NavAction) -> CliResult<()> {
        match self.nav.apply(action).await.context(SessionSnafu)? {
            NavOutcome::Disabled => println!("not available here"),
            NavOutcome::Loaded(loads) => self.print_loads(&loads),
        }
        self.print_state();
        Ok(())
    }

    async fn process_command(&self, line: &str) -> CliResult<CommandAction> {
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match cmd {
            "exit" | "quit" => return Ok(CommandAction::Break),
            "help" | "?" => print_help(),
            "back" | "b" => self.navigate(NavAction::PanBackSmall).await?,
            "fwd" | "f" => self.navigate(NavAction::PanForwardSmall).await?,
            "page-back" | "pb" => self.navigate(NavAction::PanBackPlot).await?,
            "page-fwd" | "pf" => self.navigate(NavAction::PanForwardPlot).await?,
            "earliest" => self.navigate(NavAction::JumpEarliest).await?,
            "latest" => self.navigate(NavAction::JumpLatest).await?,
            "jump" => {
                let at = parse_flexible_datetime(arg).context(InvalidWindowSnafu {
                    input: arg.to_string(),
                })?;
                self.navigate(NavAction::JumpTo(at)).await?;
            }
            "duration" => {
                let duration = parse_duration(arg)?;
                self.navigate(NavAction::SetDuration(duration)).await?;
            }
            "window" if arg.is_empty() => {
                let code = self.nav.state().window.encode().unwrap_or_default();
                println!("'{code}'");
            }
            "window" => {
                let window: TimeWindow = arg.parse().context(InvalidWindowSnafu {
                    input: arg.to_string(),
                })?;
                let loads = self.nav.set_window(window).await;
                self.print_loads(&loads);
                self.print_state();
            }
            "refresh" => {
                for event in self.refresh.tick().await {
                    println!("{}", report::refresh_text(&event));
                }
            }
            "state" => self.print_state(),
            "stats" => print!("{}", report::stats_text(&self.nav.session().stats())),
            other => println!("unknown command: {other} (type 'help')"),
        }
        Ok(CommandAction::Continue)
    }
}

fn shell_blocking(handle: Handle, ctx: ShellContext, history: Option<PathBuf>) -> CliResult<()> {
    let mut rl = DefaultEditor::new().map_err(|e| CliError::Shell {
        message: format!("failed to initialize readline: {e}"),
    })?;
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    println!("tswindow shell; type 'help' for commands");
    let loads = handle.block_on(ctx.nav.load());
    ctx.print_loads(&loads);
    ctx.print_state();

    loop {
        let line = match rl.readline("tswindow> ") {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("readline error: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        match handle.block_on(ctx.process_command(trimmed)) {
            Ok(CommandAction::Break) => break,
            Ok(CommandAction::Continue) => {}
            // Command errors are reported and the shell keeps going.
            Err(e) => println!("error: {e}"),
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

/// Run the navigation shell on a blocking thread (rustyline is blocking).
pub async fn cmd_shell(ctx: ShellContext, history: Option<PathBuf>) -> CliResult<()> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || shell_blocking(handle, ctx, history))
        .await
        .map_err(|e| CliError::Shell {
            message: format!("shell thread failed: {e}"),
        })?
}
