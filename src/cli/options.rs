use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Main modforge CLI interface
#[derive(Parser)]
#[command(name = "modforge")]
#[command(about = "Compile tenant scripts and install modules of business entities")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ModforgeCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML, or JSON by extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Tenant to operate on (overrides the configuration)
    #[arg(short, long, global = true)]
    pub tenant: Option<String>,

    /// Data directory (overrides the configuration)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the package, class and imports a source declares
    Introspect {
        /// Script source file
        file: PathBuf,
    },

    /// Compile a script source and report its diagnostics
    Compile {
        /// Script source file
        file: PathBuf,
        /// Code to store the script under (defaults to its class name)
        #[arg(long)]
        code: Option<String>,
        /// Compile only: nothing is stored or cached
        #[arg(long)]
        test: bool,
    },

    /// Print the compilation classpath
    Classpath {
        /// Supplement the classpath with the imports of this source
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Manage stored scripts
    Script {
        #[command(subcommand)]
        command: ScriptCommand,
    },

    /// Install a module from a JSON or YAML payload
    Install {
        /// Module payload file
        manifest: PathBuf,
    },

    /// Uninstall a downloaded module and install it again from its snapshot
    Reinstall { code: String },

    /// Uninstall a module
    Uninstall {
        code: String,
        /// Also remove the entities the module installed
        #[arg(long)]
        remove: bool,
    },

    /// Enable an installed module
    Enable { code: String },

    /// Disable an installed module
    Disable { code: String },

    /// Delete a module record
    Delete { code: String },

    /// List modules
    List {
        /// Only modules holding items of this type tag
        #[arg(long)]
        item_type: Option<String>,
        /// Only modules holding this item code
        #[arg(long)]
        item_code: Option<String>,
        #[arg(long)]
        installed: Option<bool>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        downloaded: Option<bool>,
        /// Print codes only
        #[arg(long)]
        codes_only: bool,
    },

    /// Export a module payload
    Export {
        code: String,
        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record an existing entity as a module item
    AddItem {
        code: String,
        item_code: String,
        /// Item type tag
        item_type: String,
    },

    /// Drop a module item reference
    RemoveItem {
        code: String,
        item_code: String,
        /// Item type tag
        item_type: String,
    },
}

#[derive(Subcommand)]
pub enum ScriptCommand {
    /// Store and compile a script source
    Add {
        file: PathBuf,
        /// Store the script as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// List stored scripts and the compiled cache state
    List,

    /// Drop the compiled entry of a script
    Clear { code: String },

    /// Recompile every active script
    CompileAll,

    /// Delete a stored script
    Remove { code: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
