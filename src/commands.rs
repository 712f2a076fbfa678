//! Commands served by the shell.
//!
//! Every command is a plain function registered under its token in a
//! [`Registry`]. The shell resolves the token of each parsed line and hands
//! the session and the parsed arguments to the handler.

mod memory;
mod update;

use std::fmt;

use log::debug;

use crate::{
    error::{Error, Result},
    parser::ParsedCommand,
    session::{Session, TXT_SUCCESS},
};

// =============================================================================
// Public Interface
// =============================================================================

/// What the shell does after a handler succeeded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    Continue,
    Exit,
}

pub type Handler = fn(&mut Session, &ParsedCommand) -> Result<Outcome>;

#[derive(Copy, Clone)]
pub struct Command {
    /// Lower-case name matched against the first word of a line.
    pub token: &'static str,
    /// Argument synopsis shown by `help`.
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: Handler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("token", &self.token)
            .field("usage", &self.usage)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: Vec<Command>,
}
impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Every command of the bootloader.
    pub fn standard() -> Self {
        let mut registry = Registry::new();
        registry
            .register(Command {
                token: "version",
                usage: "version",
                help: "Print the bootloader version",
                handler: version,
            })
            .register(Command {
                token: "help",
                usage: "help",
                help: "List all commands",
                handler: help,
            })
            .register(Command {
                token: "exit",
                usage: "exit",
                help: "Leave the bootloader and start the application",
                handler: exit,
            })
            .register(Command {
                token: "flash-erase",
                usage: "flash-erase type=<mass|sector> [sector=<dec> count=<dec>]",
                help: "Erase the whole flash or a run of sectors",
                handler: memory::flash_erase,
            })
            .register(Command {
                token: "mem-read",
                usage: "mem-read start=<hex> count=<dec>",
                help: "Send count raw bytes read from flash at start",
                handler: memory::mem_read,
            })
            .register(Command {
                token: "flash-write",
                usage: "flash-write start=<hex> count=<dec> [cksum=<no|crc32|sha256>]",
                help: "Write count bytes received in chunks to erased flash at start",
                handler: memory::flash_write,
            })
            .register(Command {
                token: "update-new",
                usage: "update-new count=<hex> type=<bin|hex|srec> [cksum=<no|crc32|sha256>]",
                help: "Receive a new application image into the pending slot",
                handler: update::update_new,
            })
            .register(Command {
                token: "update-act",
                usage: "update-act [force=<true|false>]",
                help: "Install the pending application image into the active slot",
                handler: update::update_act,
            });
        registry
    }

    /// Add a command, replacing any command registered under the same token.
    pub fn register(&mut self, command: Command) -> &mut Self {
        self.commands.retain(|c| c.token != command.token);
        self.commands.push(command);
        self
    }

    pub fn find(&self, token: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.token == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}

/// Run the handler registered for the command's name.
pub fn dispatch(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let handler = session
        .registry()
        .find(command.name())
        .ok_or_else(|| Error::CommandUnknown(command.name().to_owned()))?
        .handler;
    debug!("dispatching `{}`", command.name());
    handler(session, command)
}

// =============================================================================
// Private stuff
// =============================================================================

fn version(session: &mut Session, _: &ParsedCommand) -> Result<Outcome> {
    session.reply(&format!("v{}\r\n", env!("CARGO_PKG_VERSION")))?;
    Ok(Outcome::Continue)
}

fn help(session: &mut Session, _: &ParsedCommand) -> Result<Outcome> {
    let mut text = String::from("\r\nCommands:\r\n");
    for command in session.registry().iter() {
        text.push_str(&format!("  {}\r\n      {}\r\n", command.usage, command.help));
    }
    text.push_str("Arguments are case insensitive. Successful commands reply OK.\r\n");
    session.reply(&text)?;
    Ok(Outcome::Continue)
}

fn exit(session: &mut Session, _: &ParsedCommand) -> Result<Outcome> {
    session.reply(TXT_SUCCESS)?;
    Ok(Outcome::Exit)
}

// =============================================================================
// Unit Tests
// =============================================================================
