//! Interactive cart shell.
//!
//! Reads one command per line and re-renders the badge, floating button and
//! drawer after each one. Intents go through the same surfaces a storefront
//! page would use.

use std::str::FromStr;

use modmarket_cart::CartEngine;
use modmarket_cart::surfaces::{
    AddToCartControl, DrawerHandle, DrawerShortcut, IntentOutcome, KeyChord, KeyChordError,
};
use modmarket_core::ModId;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::CommandError;
use super::render::{Surfaces, outcome_text};

const HELP: &str = "\
Commands:
  add <mod-id>      add a mod
  remove <mod-id>   remove a mod
  clear             empty the cart
  refresh           reload from the server
  toggle            open or close the drawer
  key <chord>       press a key chord, e.g. `key Ctrl+K`
  dismiss           hide the current notice
  show              re-render
  help              this text
  quit              leave the shell";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),
    #[error("`{0}` needs a mod id")]
    MissingModId(&'static str),
    #[error("invalid mod id `{0}`")]
    InvalidModId(String),
    #[error(transparent)]
    Chord(#[from] KeyChordError),
}

/// A parsed shell line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Add(ModId),
    Remove(ModId),
    Clear,
    Refresh,
    Toggle,
    Key(KeyChord),
    Dismiss,
    Show,
    Help,
    Quit,
}

impl FromStr for ShellCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let mod_id = |name: &'static str| -> Result<ModId, ParseError> {
            if rest.is_empty() {
                return Err(ParseError::MissingModId(name));
            }
            rest.parse()
                .map_err(|_| ParseError::InvalidModId(rest.to_string()))
        };

        Ok(match word.to_ascii_lowercase().as_str() {
            "add" => Self::Add(mod_id("add")?),
            "remove" | "rm" => Self::Remove(mod_id("remove")?),
            "clear" => Self::Clear,
            "refresh" => Self::Refresh,
            "toggle" | "open" | "close" => Self::Toggle,
            "key" => Self::Key(rest.parse()?),
            "dismiss" => Self::Dismiss,
            "show" | "" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        })
    }
}

struct Shell {
    engine: CartEngine,
    surfaces: Surfaces,
    shortcut: DrawerShortcut,
}

impl Shell {
    /// Run one command and describe what happened, if anything worth saying.
    async fn execute(&self, command: ShellCommand) -> Option<String> {
        match command {
            ShellCommand::Add(mod_id) => {
                let outcome = AddToCartControl::new(self.engine.clone(), mod_id)
                    .press()
                    .await;
                Some(match outcome {
                    IntentOutcome::Ignored if self.engine.contains(mod_id) => {
                        format!("Mod {mod_id} is already in your cart.")
                    }
                    other => outcome_text(&other),
                })
            }
            ShellCommand::Remove(mod_id) => {
                Some(outcome_text(&self.surfaces.drawer.remove(mod_id).await))
            }
            ShellCommand::Clear => Some(outcome_text(&self.surfaces.drawer.clear().await)),
            ShellCommand::Refresh => match self.engine.refresh().await {
                Ok(_) => None,
                Err(e) => Some(format!("Refresh failed: {e}")),
            },
            ShellCommand::Toggle => match self.surfaces.button.click() {
                IntentOutcome::Applied => None,
                other => Some(outcome_text(&other)),
            },
            ShellCommand::Key(chord) => {
                (!self.shortcut.handle(chord)).then(|| format!("{chord} is not bound."))
            }
            ShellCommand::Dismiss => {
                self.surfaces.drawer.dismiss_notice();
                None
            }
            ShellCommand::Show | ShellCommand::Quit => None,
            ShellCommand::Help => Some(HELP.to_string()),
        }
    }
}

/// Run the shell until `quit` or end of input.
pub async fn run(engine: CartEngine, shortcut: &str) -> Result<(), CommandError> {
    let chord: KeyChord = shortcut.parse()?;
    let handle = DrawerHandle::new();
    let shell = Shell {
        surfaces: Surfaces::new(&engine, &handle),
        shortcut: DrawerShortcut::with_chord(chord, handle),
        engine,
    };

    if let Err(e) = shell.engine.refresh().await
        && !e.requires_sign_in()
    {
        println!("Could not load cart: {e}");
    }
    println!("{}\nPress {chord} or type `toggle` to open the drawer; `help` for commands.", shell.surfaces.render());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.parse::<ShellCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == ShellCommand::Quit {
            break;
        }
        if let Some(message) = shell.execute(command).await {
            println!("{message}");
        }
        if command != ShellCommand::Help {
            println!("{}", shell.surfaces.render());
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use modmarket_cart::testing::{self, MemoryCartStore, MemoryCatalog, session};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("add 42".parse::<ShellCommand>(), Ok(ShellCommand::Add(ModId::new(42))));
        assert_eq!("  RM  7 ".parse::<ShellCommand>(), Ok(ShellCommand::Remove(ModId::new(7))));
        assert_eq!("".parse::<ShellCommand>(), Ok(ShellCommand::Show));
        assert_eq!("key ctrl+k".parse::<ShellCommand>(), Ok(ShellCommand::Key(KeyChord::ctrl('k'))));
        assert_eq!("q".parse::<ShellCommand>(), Ok(ShellCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "add".parse::<ShellCommand>(),
            Err(ParseError::MissingModId("add"))
        );
        assert_eq!(
            "remove abc".parse::<ShellCommand>(),
            Err(ParseError::InvalidModId("abc".to_string()))
        );
        assert_eq!(
            "checkout".parse::<ShellCommand>(),
            Err(ParseError::Unknown("checkout".to_string()))
        );
    }

    #[tokio::test]
    async fn test_execute_routes_through_surfaces() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));
        engine.refresh().await.unwrap();
        let handle = DrawerHandle::new();
        let shell = Shell {
            surfaces: Surfaces::new(&engine, &handle),
            shortcut: DrawerShortcut::new(handle.clone()),
            engine: engine.clone(),
        };

        assert_eq!(shell.execute(ShellCommand::Add(ModId::new(42))).await.unwrap(), "Done.");
        assert_eq!(
            shell.execute(ShellCommand::Add(ModId::new(42))).await.unwrap(),
            "Mod 42 is already in your cart."
        );
        assert_eq!(shell.execute(ShellCommand::Key(KeyChord::ctrl('k'))).await, None);
        assert!(handle.is_open());
        assert_eq!(
            shell.execute(ShellCommand::Remove(ModId::new(42))).await.unwrap(),
            "Done."
        );
        assert_eq!(
            shell.execute(ShellCommand::Remove(ModId::new(42))).await.unwrap(),
            "Nothing to change."
        );
        assert_eq!(store.cart(1), Vec::<i32>::new());
    }
}
