use log::info;
use meso_traffic::{Result, Scenario};

const USAGE: &str = "usage: meso-traffic <scenario.json> [--json]";

fn main() -> Result<()> {
    env_logger::init();

    let mut path = None;
    let mut json = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            _ if path.is_none() => path = Some(arg),
            _ => {
                eprintln!("{}", USAGE);
                std::process::exit(2);
            }
        }
    }
    let Some(path) = path else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    info!("Reading scenario {}", path);
    let scenario = Scenario::load(&path)?;
    let mut sim = scenario.build()?;
    sim.run();

    let stats = sim.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", stats);
    }

    if let Some(config) = &scenario.edie {
        let state = sim.edie_state(config)?;
        println!(
            "{:<16} {:>10} {:>10} {:>10}",
            "link", "q [veh/s]", "k [veh/m]", "v [m/s]"
        );
        for link in sim.iter_links() {
            let fields = &state[link.id()];
            println!(
                "{:<16} {:>10.4} {:>10.4} {:>10.2}",
                link.name(),
                fields.q_mat.mean(),
                fields.k_mat.mean(),
                fields.v_mat.mean()
            );
        }
    }
    Ok(())
}
