use log::LevelFilter;

#[ctor::ctor]
fn init() {
    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .is_test(true)
        .try_init()
        .ok();
}

/// The degenerate ten-example partition used by the scenario tests:
/// all-zero features, one-hot labels cycling through the ten classes.
pub fn all_zero_ten_examples() -> mlp::dataset::DataSet {
    let rows: Vec<(Vec<f32>, usize)> = (0..10).map(|class| (vec![0.0; 784], class)).collect();
    mlp::dataset::DataSet::from_rows(&rows).unwrap()
}
