use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    mlm_pack::apps::run_build_records(std::env::args().skip(1))
}
