use std::path::PathBuf;
use std::time::Instant;

use gl_coarsener::{
    clustering::ClusteringMethod,
    coarsener::{CoarsenConfig, Coarsener},
    utils::format_duration,
    Result,
};
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "gl_coarsen",
    about = "Graph learning based coarsening of a sparse adjacency matrix"
)]
struct Opt {
    /// Fine adjacency matrix (Matrix Market)
    #[structopt(parse(from_os_str))]
    input: PathBuf,
    /// Where to write the prolongation operator (Matrix Market)
    #[structopt(parse(from_os_str))]
    output: PathBuf,

    /// JSON configuration, explicit flags take precedence over it
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(long)]
    dimensions: Option<usize>,
    #[structopt(long)]
    walk_length: Option<usize>,
    #[structopt(long)]
    num_walks: Option<usize>,
    /// Return parameter
    #[structopt(short)]
    p: Option<f64>,
    /// In-out parameter
    #[structopt(short)]
    q: Option<f64>,
    /// Number of clusters, n / 5 if omitted
    #[structopt(long)]
    clusters: Option<usize>,
    /// kmeans or minibatch_kmeans
    #[structopt(long)]
    method: Option<String>,
    #[structopt(long)]
    workers: Option<usize>,
    #[structopt(long)]
    seed: Option<u64>,

    /// Also write the coarse matrix P^T A P
    #[structopt(long, parse(from_os_str))]
    coarse: Option<PathBuf>,
    /// Print a JSON summary of the coarsening to stdout
    #[structopt(long)]
    summary: bool,
}

impl Opt {
    fn coarsen_config(&self) -> Result<CoarsenConfig> {
        let mut config = match &self.config {
            Some(path) => CoarsenConfig::from_json_file(path)?,
            None => CoarsenConfig::default(),
        };
        if let Some(dimensions) = self.dimensions {
            config.dimensions = dimensions;
        }
        if let Some(walk_length) = self.walk_length {
            config.walk_length = walk_length;
        }
        if let Some(num_walks) = self.num_walks {
            config.num_walks = num_walks;
        }
        if let Some(p) = self.p {
            config.p = p;
        }
        if let Some(q) = self.q {
            config.q = q;
        }
        if let Some(clusters) = self.clusters {
            config.number_of_clusters = Some(clusters);
        }
        if let Some(method) = &self.method {
            config.clustering_method = ClusteringMethod::from_name(method)?;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        Ok(config)
    }
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    if let Err(err) = run(&opt) {
        error!("{}", err);
        std::process::exit(if err.is_configuration() { 2 } else { 1 });
    }
}

fn run(opt: &Opt) -> Result<()> {
    let config = opt.coarsen_config()?;
    info!("configuration: {:?}", config);

    let timer = Instant::now();
    let mat = sprs::io::read_matrix_market::<f64, usize, _>(&opt.input)?.to_csr::<usize>();
    info!(
        "loaded {}x{} matrix with {} nonzeros",
        mat.rows(),
        mat.cols(),
        mat.nnz()
    );

    let coarsening = Coarsener::new(mat).coarsen(&config)?;
    sprs::io::write_matrix_market(&opt.output, &coarsening.p)?;
    if let Some(path) = &opt.coarse {
        sprs::io::write_matrix_market(path, &coarsening.coarse)?;
    }
    info!("total time: {}", format_duration(&timer.elapsed()));

    if opt.summary {
        println!("{}", serde_json::to_string_pretty(&coarsening.summary())?);
    }
    Ok(())
}
