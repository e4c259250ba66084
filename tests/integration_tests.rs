use reaction_network::*;

fn compile(definition: &ModelDefinition) -> Model {
    let _ = env_logger::builder().is_test(true).try_init();
    Model::compile(definition, &CompileOptions::default()).unwrap()
}

fn decay() -> Model {
    compile(
        &ModelDefinition::new("decay")
            .compartment("cell", 1.)
            .species("A", "cell", 100.)
            .species("B", "cell", 0.)
            .reaction(
                ReactionDefinition::mass_action("r", 1.)
                    .reactant("A", 1)
                    .product("B", 1),
            ),
    )
}

fn all_species(model: &Model) -> Vec<&str> {
    model.species().iter().map(|s| s.name.as_str()).collect()
}

const STOCHASTIC: [&str; 3] = [
    GillespieDirect::ALIAS,
    GibsonBruck::ALIAS,
    GillespieTauLeap::ALIAS,
];

#[test]
fn stochastic_decay_matches_exponential() {
    let model = decay();
    let registry = SimulatorRegistry::with_defaults();
    let request = SimulationRequest::new(0., 1., 11, &["A"]);
    let parameters = SimulatorParameters {
        ensemble_size: 1000,
        seed: Some(2024),
        ..Default::default()
    };

    for alias in STOCHASTIC {
        let simulator = registry.create(alias).unwrap();
        let ensemble = simulate_ensemble(
            &model,
            simulator.as_ref(),
            &request,
            &parameters,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(ensemble.runs.iter().all(|run| run.termination.is_complete()));

        let mean = ensemble.statistics.mean_of("A").unwrap()[10];
        let expected = 100. * (-1.0_f64).exp();
        // Standard error of the mean is about 0.15.
        assert!(
            (mean - expected).abs() < 1.,
            "{}: mean A(1) = {}, expected {}",
            alias,
            mean,
            expected
        );
        let variance = ensemble.statistics.variance_of("A").unwrap()[10];
        let expected_variance = 100. * (-1.0_f64).exp() * (1. - (-1.0_f64).exp());
        assert!(
            (variance / expected_variance - 1.).abs() < 0.2,
            "{}: variance {} vs {}",
            alias,
            variance,
            expected_variance
        );
    }
}

#[test]
fn deterministic_decay_matches_exponential() {
    let model = decay();
    let request = SimulationRequest::new(0., 1., 11, &["A", "B"]);
    let parameters = SimulatorParameters {
        relative_tolerance: 1e-10,
        absolute_tolerance: 1e-10,
        min_steps: 100,
        ..Default::default()
    };

    let run = simulate(&model, &RungeKuttaAdaptive, &request, &parameters)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(run.termination, Termination::EndTime);
    for (sample, &t) in run.series.times().iter().enumerate() {
        let exact = 100. * (-t).exp();
        let a = run.series.value(sample, "A").unwrap();
        let b = run.series.value(sample, "B").unwrap();
        assert!((a - exact).abs() <= 1e-6 * exact, "A({}) = {}", t, a);
        assert!((a + b - 100.).abs() < 1e-9);
    }
}

#[test]
fn every_simulator_conserves_isomerization() {
    let model = compile(
        &ModelDefinition::new("isomerization")
            .compartment("cell", 1.)
            .species("A", "cell", 60.)
            .species("B", "cell", 40.)
            .reaction(
                ReactionDefinition::mass_action("forward", 1.5)
                    .reactant("A", 1)
                    .product("B", 1),
            )
            .reaction(
                ReactionDefinition::mass_action("backward", 0.5)
                    .reactant("B", 1)
                    .product("A", 1),
            ),
    );
    let request = SimulationRequest::new(0., 5., 51, &["A", "B"]);
    let parameters = SimulatorParameters {
        seed: Some(9),
        min_steps: 500,
        ..Default::default()
    };

    let registry = SimulatorRegistry::with_defaults();
    for alias in registry.aliases() {
        let simulator = registry.create(alias).unwrap();
        let run = simulate(&model, simulator.as_ref(), &request, &parameters).unwrap();
        assert_eq!(run.termination, Termination::EndTime, "{}", alias);
        assert_eq!(run.series.len(), 51);
        for row in run.series.values().rows() {
            assert!(row[0] >= 0. && row[1] >= 0.);
            assert!((row[0] + row[1] - 100.).abs() < 1e-6, "{}: {:?}", alias, row);
        }
    }
}

#[test]
fn zero_propensities_end_cleanly() {
    let model = compile(
        &ModelDefinition::new("stuck")
            .compartment("cell", 1.)
            .species("A", "cell", 0.)
            .species("B", "cell", 7.)
            .reaction(
                ReactionDefinition::mass_action("convert", 1.)
                    .reactant("A", 1)
                    .product("B", 1),
            )
            .reaction(
                ReactionDefinition::mass_action("never", 0.)
                    .reactant("B", 1)
                    .product("A", 1),
            ),
    );
    let request = SimulationRequest::new(0., 10., 6, &["A", "B"]);

    for simulator in [&GillespieDirect as &dyn Simulator, &GibsonBruck, &GillespieTauLeap] {
        let run = simulate(&model, simulator, &request, &SimulatorParameters::default()).unwrap();
        assert_eq!(run.termination, Termination::Exhausted);
        assert_eq!(run.steps, 0);
        assert_eq!(run.series.len(), 6);
        assert_eq!(run.series.column("A").unwrap().to_vec(), vec![0.; 6]);
        assert_eq!(run.series.column("B").unwrap().to_vec(), vec![7.; 6]);
        assert!(run.into_result().is_ok());
    }
}

#[test]
fn insufficient_reactants_never_fire() {
    let model = compile(
        &ModelDefinition::new("starved")
            .compartment("cell", 1.)
            .species("A", "cell", 1.)
            .species("B", "cell", 0.)
            .species("C", "cell", 3.)
            .reaction(
                ReactionDefinition::mass_action("dimerize", 100.)
                    .reactant("A", 2)
                    .product("B", 1),
            )
            // The custom rate ignores B, but B is consumed and absent.
            .reaction(
                ReactionDefinition::custom("bind", Expression::parse("10 * C").unwrap())
                    .reactant("B", 1)
                    .reactant("C", 1),
            ),
    );
    let request = SimulationRequest::new(0., 10., 11, &["A", "B", "C"]);

    for simulator in [&GillespieDirect as &dyn Simulator, &GibsonBruck, &GillespieTauLeap] {
        let run = simulate(&model, simulator, &request, &SimulatorParameters::default()).unwrap();
        assert_eq!(run.termination, Termination::Exhausted);
        for row in run.series.values().rows() {
            assert_eq!(row.to_vec(), vec![1., 0., 3.]);
        }
    }
}

#[test]
fn cancelled_before_start_keeps_initial_sample() {
    let model = decay();
    let request = SimulationRequest::new(0., 1., 11, &["A"]);
    let token = CancellationToken::new();
    token.cancel();

    let registry = SimulatorRegistry::with_defaults();
    for alias in registry.aliases() {
        let simulator = registry.create(alias).unwrap();
        let run = simulate_with_cancellation(
            &model,
            simulator.as_ref(),
            &request,
            &SimulatorParameters::default(),
            &token,
        )
        .unwrap();
        assert_eq!(run.termination, Termination::Cancelled, "{}", alias);
        assert_eq!(run.steps, 0);
        assert_eq!(run.series.times(), &[0.]);
        assert_eq!(run.series.value(0, "A"), Some(100.));
        assert_eq!(run.into_result(), Err(Error::Cancelled));
    }
}

#[test]
fn cancelling_mid_run_returns_partial_trajectory() {
    let model = compile(
        &ModelDefinition::new("big_decay")
            .compartment("cell", 1.)
            .species("A", "cell", 1000.)
            .reaction(ReactionDefinition::mass_action("r", 1.).reactant("A", 1)),
    );
    let request = SimulationRequest::new(0., 10., 101, &["A"]);
    let token = CancellationToken::new();
    let mut seen = Vec::new();

    let outcome = {
        let cancel = token.clone();
        let mut sink = |time: f64, values: &[f64]| {
            seen.push((time, values[0]));
            if seen.len() == 3 {
                cancel.cancel();
            }
        };
        simulate_streaming(
            &model,
            &GibsonBruck,
            &request,
            &SimulatorParameters::default(),
            &token,
            &mut sink,
        )
        .unwrap()
    };

    assert_eq!(outcome.termination, Termination::Cancelled);
    assert!(seen.len() >= 3 && seen.len() < 101, "{} samples", seen.len());
    assert!(outcome.final_time < 1.);
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 >= w[1].1));
}

#[test]
fn multistep_reactions_conserve_mass() {
    let model = compile(
        &ModelDefinition::new("delay")
            .compartment("cell", 1.)
            .species("A", "cell", 200.)
            .species("B", "cell", 0.)
            .reaction(
                ReactionDefinition::mass_action("transit", 2.)
                    .reactant("A", 1)
                    .product("B", 1)
                    .steps(5),
            ),
    );
    assert_eq!(model.num_reactions(), 5);
    assert_eq!(model.num_species(), 6);

    let symbols = all_species(&model);
    let request = SimulationRequest::new(0., 4., 41, &symbols);
    let parameters = SimulatorParameters {
        seed: Some(77),
        min_steps: 400,
        ..Default::default()
    };
    let registry = SimulatorRegistry::with_defaults();
    for alias in registry.aliases() {
        let simulator = registry.create(alias).unwrap();
        let run = simulate(&model, simulator.as_ref(), &request, &parameters).unwrap();
        assert!(run.termination.is_complete(), "{}: {}", alias, run.termination);
        for row in run.series.values().rows() {
            assert!((row.sum() - 200.).abs() < 1e-6, "{}: {:?}", alias, row);
        }
        // B lags behind A by the whole chain.
        let b = run.series.column("B").unwrap();
        assert_eq!(b[0], 0.);
        assert!(b[40] > b[4]);
    }
}

#[test]
fn time_dependent_rates() {
    let model = compile(
        &ModelDefinition::new("switch")
            .compartment("cell", 1.)
            .species("B", "cell", 0.)
            .parameter("k", 2.)
            .reaction(
                ReactionDefinition::custom(
                    "pulse",
                    Expression::parse("k * theta(time - 5)").unwrap(),
                )
                .product("B", 1),
            ),
    );
    let request = SimulationRequest::new(0., 10., 11, &["B", "time"]);
    let parameters = SimulatorParameters {
        relative_tolerance: 1e-8,
        absolute_tolerance: 1e-8,
        min_steps: 100,
        ..Default::default()
    };

    let run = simulate(&model, &RungeKuttaAdaptive, &request, &parameters)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(run.series.column("time").unwrap().to_vec(), request.sample_times());
    assert_eq!(run.series.value(5, "B"), Some(0.));
    let b = run.series.value(10, "B").unwrap();
    assert!((b - 10.).abs() < 1e-3, "B(10) = {}", b);
}

#[test]
fn failures_are_typed() {
    let model = decay();
    let unknown = SimulationRequest::new(0., 1., 2, &["A", "Z"]);
    assert_eq!(
        simulate(&model, &GillespieDirect, &unknown, &SimulatorParameters::default()),
        Err(Error::DataNotFound("Z".to_string()))
    );
    assert!(matches!(Expression::parse("k * (A"), Err(Error::InvalidInput(_))));

    let explosive = compile(
        &ModelDefinition::new("explosive")
            .compartment("cell", 1.)
            .species("A", "cell", 1.)
            .reaction(
                ReactionDefinition::mass_action("autocatalysis", 1.)
                    .reactant("A", 2)
                    .product("A", 3),
            ),
    );
    // dA/dt = A^2 diverges at t = 1, between the two sample times.
    let request = SimulationRequest::new(0., 2., 2, &["A"]);
    let run = simulate(
        &explosive,
        &RungeKuttaAdaptive,
        &request,
        &SimulatorParameters {
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-8,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(matches!(
        run.termination,
        Termination::Failed(Error::NumericalFailure(_))
    ));
    assert_eq!(run.series.len(), 1);
    assert!(matches!(run.into_result(), Err(Error::NumericalFailure(_))));
}

#[test]
fn infinite_propensities_fail_every_stochastic_method() {
    let model = compile(
        &ModelDefinition::new("singular")
            .compartment("cell", 1.)
            .species("B", "cell", 0.)
            .parameter("C", 0.)
            .reaction(
                ReactionDefinition::custom("source", Expression::parse("1 / C").unwrap())
                    .product("B", 1),
            ),
    );
    let registry = SimulatorRegistry::with_defaults();
    let request = SimulationRequest::new(0., 1., 2, &["B"]);
    let parameters = SimulatorParameters {
        seed: Some(3),
        max_events: Some(100_000),
        ..Default::default()
    };

    for alias in STOCHASTIC {
        let simulator = registry.create(alias).unwrap();
        let run = simulate(&model, simulator.as_ref(), &request, &parameters).unwrap();
        assert!(
            matches!(run.termination, Termination::Failed(Error::NumericalFailure(_))),
            "{}: {}",
            alias,
            run.termination
        );
        assert_eq!(run.steps, 0);
        assert_eq!(run.final_time, 0.);
        assert_eq!(run.series.len(), 1);
    }
}

#[test]
fn models_load_from_json() {
    let json = r#"{
        "name": "json",
        "compartments": [{"name": "cell", "volume": 1.0}],
        "species": [
            {"name": "A", "compartment": "cell", "initial": 10},
            {"name": "B", "compartment": "cell", "initial": 0}
        ],
        "parameters": [{"name": "k", "value": "0.5 * 2"}],
        "reactions": [{
            "name": "r",
            "reactants": [{"species": "A", "stoichiometry": 1}],
            "products": [{"species": "B", "stoichiometry": 1}],
            "rate": {"mass_action": "k"}
        }]
    }"#;
    let definition: ModelDefinition = serde_json::from_str(json).unwrap();
    let model = compile(&definition);
    let request = SimulationRequest::new(0., 100., 2, &["A", "B"]);
    let run = simulate(
        &model,
        &GillespieDirect,
        &request,
        &SimulatorParameters {
            seed: Some(1),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(run.termination, Termination::Exhausted);
    assert_eq!(run.series.value(1, "B"), Some(10.));
}
