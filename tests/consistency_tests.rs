use reaction_network::*;

fn binding() -> Model {
    let _ = env_logger::builder().is_test(true).try_init();
    let definition = ModelDefinition::new("binding")
        .compartment("cell", 1.)
        .species("A", "cell", 60.)
        .species("B", "cell", 40.)
        .species("C", "cell", 0.)
        .species("D", "cell", 0.)
        .parameter("kon", 0.01)
        .reaction(
            ReactionDefinition::mass_action("bind", Expression::symbol("kon"))
                .reactant("A", 1)
                .reactant("B", 1)
                .product("C", 1),
        )
        .reaction(
            ReactionDefinition::mass_action("unbind", 0.2)
                .reactant("C", 1)
                .product("A", 1)
                .product("B", 1),
        )
        .reaction(
            ReactionDefinition::custom(
                "dimerize",
                Expression::parse("k * C * (C - 1) / 2").unwrap(),
            )
            .reactant("C", 2)
            .product("D", 1)
            .parameter("k", 0.005),
        );
    Model::compile(&definition, &CompileOptions::default()).unwrap()
}

fn ensemble(model: &Model, simulator: &dyn Simulator, seed: u64) -> Ensemble {
    let request = SimulationRequest::new(0., 5., 6, &["A", "C", "D"]);
    let parameters = SimulatorParameters {
        ensemble_size: 2000,
        seed: Some(seed),
        ..Default::default()
    };
    simulate_ensemble(model, simulator, &request, &parameters, &CancellationToken::new()).unwrap()
}

#[test]
fn direct_and_next_reaction_methods_agree() {
    let model = binding();
    let direct = ensemble(&model, &GillespieDirect, 1);
    let next_reaction = ensemble(&model, &GibsonBruck, 2);

    for symbol in ["A", "C", "D"] {
        for sample in 2..6 {
            let mean_direct = direct.statistics.mean_of(symbol).unwrap()[sample];
            let mean_next = next_reaction.statistics.mean_of(symbol).unwrap()[sample];
            let error = (direct.statistics.standard_error(sample, symbol).unwrap().powi(2)
                + next_reaction.statistics.standard_error(sample, symbol).unwrap().powi(2))
            .sqrt();
            assert!(
                (mean_direct - mean_next).abs() < 5. * error + 1e-9,
                "{} at sample {}: {} vs {} (error {})",
                symbol,
                sample,
                mean_direct,
                mean_next,
                error
            );

            let variance_direct = direct.statistics.variance_of(symbol).unwrap()[sample];
            let variance_next = next_reaction.statistics.variance_of(symbol).unwrap()[sample];
            assert!(
                (variance_direct - variance_next).abs()
                    <= 0.3 * variance_direct.max(variance_next),
                "{} at sample {}: variance {} vs {}",
                symbol,
                sample,
                variance_direct,
                variance_next
            );
        }
    }
}

#[test]
fn simulators_reproduce_their_seeds() {
    let model = binding();
    for simulator in [&GillespieDirect as &dyn Simulator, &GibsonBruck] {
        let first = ensemble(&model, simulator, 5);
        let second = ensemble(&model, simulator, 5);
        assert_eq!(first.runs, second.runs);
        assert_eq!(first.statistics, second.statistics);
    }
}

#[test]
fn stochastic_mean_approaches_rate_equations() {
    let _ = env_logger::builder().is_test(true).try_init();
    // A first-order network has exact means given by its rate equations.
    let definition = ModelDefinition::new("chain")
        .compartment("cell", 1.)
        .species("A", "cell", 200.)
        .species("B", "cell", 0.)
        .species("C", "cell", 0.)
        .reaction(
            ReactionDefinition::mass_action("first", 1.)
                .reactant("A", 1)
                .product("B", 1),
        )
        .reaction(
            ReactionDefinition::mass_action("second", 0.5)
                .reactant("B", 1)
                .product("C", 1),
        );
    let model = Model::compile(&definition, &CompileOptions::default()).unwrap();
    let request = SimulationRequest::new(0., 3., 4, &["A", "B", "C"]);

    let deterministic = simulate(
        &model,
        &RungeKuttaAdaptive,
        &request,
        &SimulatorParameters {
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-8,
            ..Default::default()
        },
    )
    .unwrap();
    let stochastic = ensemble_of(&model, &request);

    for symbol in ["A", "B", "C"] {
        for sample in 0..4 {
            let exact = deterministic.series.value(sample, symbol).unwrap();
            let mean = stochastic.statistics.mean_of(symbol).unwrap()[sample];
            let error = stochastic.statistics.standard_error(sample, symbol).unwrap();
            assert!(
                (exact - mean).abs() < 5. * error + 1e-9,
                "{} at sample {}: {} vs {}",
                symbol,
                sample,
                exact,
                mean
            );
        }
    }
}

fn ensemble_of(model: &Model, request: &SimulationRequest) -> Ensemble {
    let parameters = SimulatorParameters {
        ensemble_size: 1000,
        seed: Some(31),
        num_threads: Some(4),
        ..Default::default()
    };
    simulate_ensemble(model, &GibsonBruck, request, &parameters, &CancellationToken::new()).unwrap()
}

#[test]
fn tau_leaping_follows_rate_equations() {
    let _ = env_logger::builder().is_test(true).try_init();
    let definition = ModelDefinition::new("isomerization")
        .compartment("cell", 1.)
        .species("A", "cell", 100_000.)
        .species("B", "cell", 0.)
        .reaction(
            ReactionDefinition::mass_action("forward", 1.)
                .reactant("A", 1)
                .product("B", 1),
        )
        .reaction(
            ReactionDefinition::mass_action("backward", 0.5)
                .reactant("B", 1)
                .product("A", 1),
        );
    let model = Model::compile(&definition, &CompileOptions::default()).unwrap();
    let request = SimulationRequest::new(0., 2., 5, &["A", "B"]);

    let deterministic = simulate(
        &model,
        &RungeKuttaAdaptive,
        &request,
        &SimulatorParameters {
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-8,
            ..Default::default()
        },
    )
    .unwrap();
    let leaping = simulate_ensemble(
        &model,
        &GillespieTauLeap,
        &request,
        &SimulatorParameters {
            ensemble_size: 100,
            seed: Some(8),
            ..Default::default()
        },
        &CancellationToken::new(),
    )
    .unwrap();

    for run in leaping.runs.iter() {
        assert_eq!(run.termination, Termination::EndTime);
        // Far fewer steps than the roughly 150,000 single events.
        assert!(run.steps < 5_000, "{} steps", run.steps);
    }
    for symbol in ["A", "B"] {
        for sample in 1..5 {
            let exact = deterministic.series.value(sample, symbol).unwrap();
            let mean = leaping.statistics.mean_of(symbol).unwrap()[sample];
            // Leaping trades a small bias for speed.
            assert!(
                (exact - mean).abs() < 0.02 * exact,
                "{} at sample {}: {} vs {}",
                symbol,
                sample,
                exact,
                mean
            );
        }
    }
}
