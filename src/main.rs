use reaction_network::{
    simulate_ensemble, CancellationToken, CompileOptions, Expression, Model, ModelDefinition,
    ReactionDefinition, SimulationRequest, SimulatorParameters, SimulatorRegistry,
};
use std::fs;
use tqdm::tqdm;

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    env_logger::init();
    profile()
}

fn michaelis_menten() -> reaction_network::Result<ModelDefinition> {
    Ok(ModelDefinition::new("michaelis_menten")
        .compartment("cell", 1.0)
        .species("E", "cell", 100.)
        .species("S", "cell", 500.)
        .species("ES", "cell", 0.)
        .species("P", "cell", 0.)
        .parameter("kf", 0.01)
        .parameter("kr", 0.1)
        .parameter("kcat", 0.1)
        .reaction(
            ReactionDefinition::mass_action("bind", Expression::symbol("kf"))
                .reactant("E", 1)
                .reactant("S", 1)
                .product("ES", 1),
        )
        .reaction(
            ReactionDefinition::custom("unbind", Expression::parse("kr * ES")?)
                .reactant("ES", 1)
                .product("E", 1)
                .product("S", 1),
        )
        .reaction(
            ReactionDefinition::mass_action("catalyze", Expression::symbol("kcat"))
                .reactant("ES", 1)
                .product("E", 1)
                .product("P", 1),
        ))
}

/// Runs an ensemble of a model with every registered simulator and writes
/// the per-sample statistics to `data/`. The model is read from the JSON
/// file given as first argument, or is a built-in Michaelis-Menten system.
fn profile() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let definition = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => michaelis_menten()?,
    };
    let model = Model::compile(&definition, &CompileOptions::default())?;

    let symbols: Vec<&str> = model.species().iter().map(|s| s.name.as_str()).collect();
    let request = SimulationRequest::new(0., 100., 201, &symbols);
    let parameters = SimulatorParameters {
        ensemble_size: 200,
        seed: Some(1),
        ..Default::default()
    };
    let token = CancellationToken::new();

    fs::create_dir_all("data")?;
    let registry = SimulatorRegistry::with_defaults();
    let aliases: Vec<&str> = registry.aliases().collect();
    for alias in tqdm(aliases) {
        let simulator = registry.create(alias)?;
        let ensemble =
            simulate_ensemble(&model, simulator.as_ref(), &request, &parameters, &token)?;
        fs::write(
            format!("data/{}_{}.json", model.name(), alias),
            serde_json::to_string(&ensemble.statistics)?,
        )?;
    }

    Ok(())
}
