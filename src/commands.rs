//! CLI command definitions
//!
//! Defines the clap commands for the inspector CLI.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Attach to a debuggable target (browser tab or script runtime)
    Connect {
        /// Target as host:port, or just a port on localhost
        target: String,

        /// Human-readable reference for the new session
        #[arg(long, short)]
        reference: Option<String>,

        /// Tab index within a browser target process
        #[arg(long)]
        tab: Option<usize>,
    },

    /// List open sessions
    Sessions,

    /// Make a session the default target for reference-free commands
    Use {
        /// Session id or reference
        session: String,
    },

    /// Close a session (the active one when unspecified)
    Close {
        /// Session id or reference
        session: Option<String>,
    },

    /// Show daemon and session status
    Status,

    /// Breakpoint management
    #[command(subcommand)]
    Breakpoint(BreakpointCommands),

    /// Shorthand for 'breakpoint add'
    #[command(name = "break", alias = "b")]
    Break {
        /// Location: file:line or file:line:column
        location: String,

        /// Only pause when this expression is true
        #[arg(long, short)]
        condition: Option<String>,

        /// Session id or reference (default: active session)
        #[arg(long)]
        session: Option<String>,
    },

    /// Logpoint management
    #[command(subcommand)]
    Logpoint(LogpointCommands),

    /// Pause execution
    Pause {
        #[arg(long)]
        session: Option<String>,
    },

    /// Resume execution
    #[command(alias = "c")]
    Resume {
        #[arg(long)]
        session: Option<String>,
    },

    /// Step over (execute current line, step over calls)
    #[command(alias = "n")]
    Next {
        #[arg(long)]
        session: Option<String>,
    },

    /// Step into (execute current line, enter calls)
    #[command(alias = "s")]
    Step {
        #[arg(long)]
        session: Option<String>,
    },

    /// Step out (run until the current function returns)
    #[command(alias = "out")]
    Finish {
        #[arg(long)]
        session: Option<String>,
    },

    /// Print the call stack of the current pause
    #[command(alias = "bt")]
    Backtrace {
        #[arg(long)]
        session: Option<String>,
    },

    /// List variables visible from a paused frame
    Variables {
        /// Call frame id (default: top frame)
        #[arg(long)]
        frame: Option<String>,

        /// Include the global scope
        #[arg(long)]
        global: bool,

        /// Only show variables whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Expand object values
        #[arg(long)]
        expand: bool,

        /// Expansion depth
        #[arg(long, default_value = "1")]
        depth: u32,

        #[arg(long)]
        session: Option<String>,
    },

    /// Evaluate an expression in a paused frame
    #[command(alias = "p")]
    Eval {
        /// Expression to evaluate
        expression: String,

        /// Call frame id (default: top frame)
        #[arg(long)]
        frame: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Print source text of a loaded script
    Source {
        /// Script file or URL
        file: String,

        /// First line to print (1-based)
        #[arg(long)]
        from: Option<u32>,

        /// Last line to print (inclusive)
        #[arg(long)]
        to: Option<u32>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Shut down the daemon, closing every session
    Shutdown,

    /// Run the daemon (spawned automatically; not for interactive use)
    #[command(hide = true)]
    Daemon,
}

#[derive(Subcommand)]
pub enum BreakpointCommands {
    /// Add a breakpoint
    Add {
        /// Location: file:line or file:line:column
        location: String,

        /// Only pause when this expression is true
        #[arg(long, short)]
        condition: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Remove a breakpoint or logpoint
    Remove {
        /// Breakpoint id
        id: String,

        #[arg(long)]
        session: Option<String>,
    },

    /// List placed breakpoints and logpoints
    List {
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LogpointCommands {
    /// Add a logpoint: logs a message template with {expr} placeholders
    /// instead of pausing, until the execution ceiling is crossed
    Add {
        /// Location: file:line or file:line:column
        location: String,

        /// Message template, e.g. "cart has {cart.items.length} items"
        template: String,

        /// Maximum hits before the logpoint forces a pause
        #[arg(long, default_value = "50")]
        ceiling: u32,

        #[arg(long)]
        session: Option<String>,
    },

    /// Zero a logpoint's execution counter (both sides) after a breach
    Reset {
        /// Breakpoint id
        id: String,

        #[arg(long)]
        session: Option<String>,
    },
}
