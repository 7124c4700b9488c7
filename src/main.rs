use clap::{Parser, Subcommand};
use skc_ledger::api::{self, ApiConfig};
use skc_ledger::cli;
use skc_ledger::config::LedgerConfig;
use skc_ledger::types::Status;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skc")]
#[command(about = "Track product SKCs and move projects in and out of Excel workbooks")]
#[command(long_about = "SKC Ledger - product SKC inventory tracker

Projects group products; each product owns a list of SKC codes with a status.
SKC codes are unique across the whole ledger.

WORKBOOK LAYOUT (one column pair per product):
  Row 1  product name (merged over the pair)
  Row 2  primary image thumbnail (export only)
  Row 3  sub-headers: SKC | 状态
  Row 4+ one SKC code and its status per row

COMMANDS:
  init        - Create the database and the default user
  import      - Import a workbook into a project
  export      - Export a project to a workbook
  project     - Add, list or archive projects
  product     - Add or list products
  skc list    - List a product's SKCs, optionally by status
  image       - Add, list, delete or promote product images
  add-skcs    - Add SKC codes to a product
  status      - Change the status of SKC codes
  serve       - Start the HTTP API server

EXAMPLES:
  skc init
  skc project add \"Spring 2025\"
  skc import 1 catalog.xlsx
  skc export 1
  skc status 已下架 SKC001 SKC002")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "SKC_CONFIG")]
    config: Option<PathBuf>,

    /// Acting username
    #[arg(short, long, global = true, env = "SKC_USER", default_value = "admin")]
    user: String,

    /// Show verbose output and log events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, upload directories and the acting user
    Init,

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage products
    #[command(subcommand)]
    Product(ProductCommands),

    #[command(long_about = "Import an Excel workbook (.xlsx/.xlsm) into a project.

Every sheet is scanned in column pairs (A-B, C-D, ...). Row 1 names the
product; rows 4+ hold SKC code and status. Products are created on demand.

RECONCILIATION:
  - SKC codes already present anywhere in the ledger are skipped
  - Unknown status labels fall back to 核价通过
  - Rows with only one of code/status filled (including an empty status)
    are counted as incomplete and not imported

The input file is copied to the upload area first and is never modified.")]
    /// Import an Excel workbook into a project
    Import {
        /// Target project id
        project: i64,

        /// Path to Excel file (.xlsx)
        file: PathBuf,
    },

    #[command(long_about = "Export a project to an Excel workbook.

Writes {project}_{YYYYMMDD_HHMMSS}.xlsx into the export directory and records
it so it can be downloaded by id through the API.")]
    /// Export a project to an Excel workbook
    Export {
        /// Project id
        project: i64,
    },

    /// Manage product images
    #[command(subcommand)]
    Image(ImageCommands),

    /// Inspect SKCs
    #[command(subcommand)]
    Skc(SkcCommands),

    /// Add SKC codes to a product with one status
    AddSkcs {
        /// Product id
        product: i64,

        /// SKC codes
        #[arg(required = true)]
        codes: Vec<String>,

        /// Status label for every code
        #[arg(short, long, default_value_t = Status::default().label().to_string())]
        status: String,
    },

    /// Delete SKC codes
    DeleteSkcs {
        /// SKC codes
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Set the status of SKC codes (unknown statuses are rejected)
    Status {
        /// Status label
        status: String,

        /// SKC codes
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Show counts for the acting user
    Stats,

    /// Start the HTTP API server
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "SKC_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "SKC_PORT")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add { username: String },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project owned by the acting user
    Add {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List active projects, most recently updated first
    List,

    /// Archive a project (it stops resolving; its name can be reused)
    Archive { project: i64 },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Create a product in a project
    Add { project: i64, name: String },

    /// List the products of a project
    List { project: i64 },
}

#[derive(Subcommand)]
enum SkcCommands {
    /// List a product's SKCs in status precedence, then code order
    List {
        product: i64,

        /// Only SKCs with this status label
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Attach an image file to a product
    Add { product: i64, file: PathBuf },

    /// Make an image the product's primary image
    Primary { image: i64 },

    /// List a product's images, primary first
    List { product: i64 },

    /// Delete an image and its stored file
    Delete { image: i64 },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if args.verbose {
        api::init_tracing("skc_ledger=debug");
    }

    let config = LedgerConfig::load(args.config.as_deref())?;
    let user = args.user.as_str();

    match args.command {
        Commands::Init => {
            cli::init(&config, user)?;
        }

        Commands::User(UserCommands::Add { username }) => {
            cli::add_user(&config, &username)?;
        }

        Commands::Project(ProjectCommands::Add { name, description }) => {
            cli::add_project(&config, user, &name, description.as_deref())?;
        }

        Commands::Project(ProjectCommands::List) => {
            cli::list_projects(&config, user)?;
        }

        Commands::Project(ProjectCommands::Archive { project }) => {
            cli::archive_project(&config, user, project)?;
        }

        Commands::Product(ProductCommands::Add { project, name }) => {
            cli::add_product(&config, user, project, &name)?;
        }

        Commands::Product(ProductCommands::List { project }) => {
            cli::list_products(&config, user, project)?;
        }

        Commands::Skc(SkcCommands::List { product, status }) => {
            cli::list_skcs(&config, user, product, status.as_deref())?;
        }

        Commands::Import { project, file } => {
            cli::import(&config, user, project, file, args.verbose)?;
        }

        Commands::Export { project } => {
            cli::export(&config, user, project, args.verbose)?;
        }

        Commands::Image(ImageCommands::Add { product, file }) => {
            cli::add_image(&config, user, product, &file)?;
        }

        Commands::Image(ImageCommands::Primary { image }) => {
            cli::set_primary_image(&config, user, image)?;
        }

        Commands::Image(ImageCommands::List { product }) => {
            cli::list_images(&config, user, product)?;
        }

        Commands::Image(ImageCommands::Delete { image }) => {
            cli::delete_image(&config, user, image)?;
        }

        Commands::AddSkcs {
            product,
            codes,
            status,
        } => {
            cli::add_skcs(&config, user, product, &codes, &status)?;
        }

        Commands::DeleteSkcs { codes } => {
            cli::delete_skcs(&config, user, &codes)?;
        }

        Commands::Status { status, codes } => {
            cli::update_status(&config, user, &status, &codes)?;
        }

        Commands::Stats => cli::stats(&config, user)?,

        Commands::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(api::run_api_server(ApiConfig { host, port }, config))?;
        }
    }

    Ok(())
}
