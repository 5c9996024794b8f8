use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde_json::json;
use std::time::{Duration, Instant};
use tangram_bin_sums::{
	bin_sums, bin_sums_parallel, BinSumsOptions, BoostingContext, InnerBag, Task, Term, TrainingSet,
};

#[derive(Parser)]
#[clap(about = "time bin sums on synthetic data")]
struct Options {
	#[clap(long, default_value = "1000000", help = "the number of samples")]
	n_samples: usize,
	#[clap(long, default_value = "1", help = "the number of classes, 1 for regression")]
	n_classes: usize,
	#[clap(long, default_value = "256", help = "the number of bins in the term")]
	n_bins: usize,
	#[clap(long, default_value = "10", help = "the number of times to run each pass")]
	rounds: usize,
	#[clap(long, default_value = "42")]
	seed: u64,
	#[clap(long, help = "split each pass across the rayon thread pool")]
	parallel: bool,
	#[clap(long = "no-specializations", help = "always use the dynamic bit pack", parse(from_flag = std::ops::Not::not))]
	use_bit_pack_specializations: bool,
}

fn main() {
	let env = env_logger::Env::default().default_filter_or("tangram_bin_sums=info");
	env_logger::Builder::from_env(env)
		.format_level(false)
		.format_module_path(false)
		.format_timestamp(None)
		.init();

	let options = Options::parse();
	let task = if options.n_classes == 1 {
		Task::Regression
	} else {
		Task::classification(options.n_classes).unwrap()
	};

	// Generate the data.
	let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
	let terms = vec![Term::new(vec![options.n_bins]).unwrap()];
	let tensor_bin_indices: Vec<usize> = (0..options.n_samples)
		.map(|_| rng.gen_range(0, options.n_bins))
		.collect();
	let mut training_set =
		TrainingSet::new(task, &terms, options.n_samples, &[tensor_bin_indices]).unwrap();
	for value in training_set.gradients_and_hessians_mut().iter_mut() {
		*value = rng.gen_range(-1.0, 1.0);
	}
	let inner_bag = InnerBag::bootstrap(options.n_samples, None, &mut rng).unwrap();
	let bin_sums_options = BinSumsOptions {
		use_bit_pack_specializations: options.use_bit_pack_specializations,
		..Default::default()
	};
	let context = BoostingContext::new(terms, training_set, bin_sums_options).unwrap();
	log::info!(
		"{} samples, {} scores, {} items per word",
		options.n_samples,
		task.n_scores(),
		context.terms()[0].bit_pack(),
	);

	// Time each pass.
	for term_index in &[None, Some(0)] {
		let mut bins = context.new_bin_buffer(*term_index);
		let mut duration = Duration::default();
		for _ in 0..options.rounds {
			bins.reset();
			let start = Instant::now();
			if options.parallel {
				let n_chunks = rayon::current_num_threads();
				bin_sums_parallel(&context, &mut bins, *term_index, &inner_bag, n_chunks);
			} else {
				bin_sums(&context, &mut bins, *term_index, &inner_bag);
			}
			duration += start.elapsed();
		}
		let output = json!({
			"term": term_index,
			"parallel": options.parallel,
			"mean_duration_ms": duration.as_secs_f64() * 1000.0 / options.rounds.max(1) as f64,
			"weight": bins.total_weight(),
		});
		println!("{}", output);
	}

	#[cfg(feature = "timing")]
	log::info!("{:?}", tangram_bin_sums::timing::TIMING);
}
