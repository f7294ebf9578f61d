use sim_lib::memory::cache::Cache;
use sim_lib::memory::Memory;
use sim_lib::run_wrapper::run_trace;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let param_tokens: Vec<String> = std::env::args().collect();
    let trace_path = param_tokens
        .get(1)
        .ok_or("You should specify exactly one trace file")?;

    // Replay the trace against a direct-mapped cache at each line
    // count and plot the observed hit rate
    let line_counts = vec![4, 8, 16, 32, 64, 128];

    let mut data: Vec<(usize, f64)> = vec![];
    for lines in line_counts.iter() {
        let mut cache = Cache::with_lines(Memory::make(), *lines);
        let hit_rate = run_trace(&mut cache, trace_path)?;
        data.push((*lines, hit_rate));
    }

    // Plot the data
    use plotters::prelude::*;

    let trace_base_name = String::from(trace_path.split('/').last().unwrap());
    let plot_title = format!("Cache evaluation (hit rate): {}", trace_base_name);
    let output_path = format!("eval/cache_eval_{}.svg", trace_base_name);

    let root =
        SVGBackend::new(output_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE).unwrap();

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(4..128, 0.0..1.0)
        .unwrap();
    ctx.configure_mesh()
        .x_desc("Cache lines")
        .y_desc("Hit rate")
        .draw()
        .unwrap();

    let series = data.iter().map(|(x, y)| (*x as i32, *y));
    let color = Palette99::pick(0).to_rgba();
    ctx.draw_series(LineSeries::new(series, color))
        .unwrap()
        .label("Direct-mapped")
        .legend(move |(x, y)| {
            PathElement::new(vec![(x, y), (x + 20, y)], color)
        });

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .unwrap();

    Ok(())
}
