use sgde::base::FitterConfig;
use sgde::database::{DecompositionDatabase, FingerprintKey};
use sgde::offline::StoredHeader;
use sgde::SgdeError;
use std::path::Path;
use structopt::StructOpt;

/// Command line options
#[derive(StructOpt, Debug)]
#[structopt(
    name = "sgde_inspect",
    about = "Prints the header of a stored decomposition and optionally checks the cache entry of a configuration"
)]
struct Options {
    /// Stored decomposition file
    decomposition: String,

    /// JSON file with the fitter configuration
    #[structopt(long)]
    config: Option<String>,

    /// Cache index file (defaults to the one named in the configuration)
    #[structopt(long)]
    database: Option<String>,
}

fn main() -> Result<(), SgdeError> {
    // parse options
    let options = Options::from_args();

    // header
    let header = StoredHeader::read(&options.decomposition)?;
    println!("file         = {}", options.decomposition);
    println!("kind         = {}", header.kind);
    println!("payload      = {} × {}", header.nrow, header.ncol);
    println!("interactions = {:?}", header.interactions);

    // fingerprint and cache entry
    if let Some(config_path) = &options.config {
        let config = FitterConfig::read_json(config_path)?;
        let key = FingerprintKey::new(
            &config.grid,
            &config.refinement,
            &config.regularization,
            &config.density,
        )?;
        println!("fingerprint  = {}", key.file_stem());
        let index = options.database.as_ref().or(config.database.filepath.as_ref());
        match index {
            Some(index) if Path::new(index).exists() => {
                let database = DecompositionDatabase::open_read_only(index)?;
                match database.lookup(&key)? {
                    Some(path) => println!("cached at    = {}", path),
                    None => println!("cached at    = (not registered in {})", index),
                }
            }
            Some(index) => println!("cached at    = (index {} does not exist)", index),
            None => {}
        }
        if header.kind != config.density.decomposition {
            println!("warning: the file holds a {} factor, the configuration asks for {}", header.kind, config.density.decomposition);
        }
    }
    Ok(())
}
