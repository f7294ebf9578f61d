use sim_lib::cpu::CPUPolicy;
use sim_lib::run_wrapper;
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let source_file = args
        .next()
        .ok_or("You should specify exactly one assembly source file")?;

    let mut policy = CPUPolicy::default();

    for arg in args {
        match arg.as_str() {
            "-v" => policy.verbose = true,
            "-h" => policy.history = true,
            _ => return Err(format!("Unknown parameter: {}", arg).into()),
        }
    }

    let (instructions, steps, hit_rate) =
        run_wrapper::run(&source_file, policy)?;

    println!("# instructions = {}", instructions);
    println!("# micro-steps = {}", steps);
    println!(
        "steps/instruction = {:.2}",
        steps as f64 / instructions as f64
    );
    println!("cache hit rate = {:.2}", hit_rate);

    Ok(())
}
