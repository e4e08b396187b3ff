#[cfg(test)]
mod kernel_tests {
    use matmul_sim::{
        BitVector, Device, MatrixMultiplier, MultiplierParams, MultiplierPorts, PortDecl,
        PortShape, SignalStore, SignalValue, SimCapabilities, SimulationConfig, SimulationError,
        SimulationResult, Simulator,
    };

    /// `q` follows `d` one cycle later
    struct Register;

    impl Device for Register {
        fn name(&self) -> &str {
            "register"
        }

        fn ports(&self, _capabilities: &SimCapabilities) -> Vec<PortDecl> {
            vec![
                PortDecl::input("clk", PortShape::Scalar, 1),
                PortDecl::input("d", PortShape::Scalar, 8),
                PortDecl::output("q", PortShape::Scalar, 8),
            ]
        }

        fn on_rising_edge(&mut self, signals: &mut SignalStore) -> SimulationResult<()> {
            let d = signals.read("d")?.clone();
            signals.write("q", d)
        }
    }

    fn register_sim(max_cycles: u64) -> Simulator {
        let config = SimulationConfig {
            max_cycles,
            ..Default::default()
        };
        Simulator::new(config, Box::new(Register)).expect("Failed to build simulator")
    }

    fn scalar(sample_value: &SignalValue) -> u64 {
        sample_value
            .as_scalar()
            .and_then(BitVector::to_u64)
            .expect("Expected a narrow scalar")
    }

    #[tokio::test]
    async fn test_samples_arrive_once_per_cycle_in_order() {
        let mut sim = register_sim(100);
        let mut samples = sim.subscribe();

        for value in 1..=5u64 {
            sim.write("d", SignalValue::Scalar(BitVector::from_u64(8, value).unwrap()))
                .unwrap();
            sim.rising_edge().await.unwrap();
        }
        sim.close_samples();

        let mut seen = Vec::new();
        while let Some(sample) = samples.recv().await {
            seen.push((
                sample.cycle,
                scalar(sample.signals.read("d").unwrap()),
                scalar(sample.signals.read("q").unwrap()),
            ));
        }
        // q shows the value d had in the previous cycle
        assert_eq!(
            seen,
            vec![(0, 1, 0), (1, 2, 1), (2, 3, 2), (3, 4, 3), (4, 5, 4), (5, 5, 5)]
        );
    }

    #[tokio::test]
    async fn test_sample_time_follows_clock_period() {
        let mut sim = register_sim(100);
        let mut samples = sim.subscribe();
        sim.clock_cycles(3).await.unwrap();
        sim.close_samples();

        let mut times = Vec::new();
        while let Some(sample) = samples.recv().await {
            times.push(sample.time_ps);
        }
        // The first edge comes after the low half of the period
        assert_eq!(times, vec![0, 2_500, 7_500, 12_500]);
    }

    #[tokio::test]
    async fn test_cycle_limit_stops_the_run() {
        let mut sim = register_sim(4);
        let result = sim.clock_cycles(10).await;
        assert!(matches!(result, Err(SimulationError::Timeout(4))));
        assert_eq!(sim.cycle(), 4);
    }

    #[tokio::test]
    async fn test_outputs_are_read_only_for_the_testbench() {
        let mut sim = register_sim(10);
        let q = SignalValue::Scalar(BitVector::from_u64(8, 1).unwrap());
        assert!(matches!(
            sim.write("q", q),
            Err(SimulationError::NotAnInput(_))
        ));
        assert!(matches!(
            sim.write_flag("missing", true),
            Err(SimulationError::UnknownSignal(_))
        ));
    }

    #[tokio::test]
    async fn test_port_shapes_follow_capabilities() {
        let params = MultiplierParams {
            data_width: 8,
            a_rows: 2,
            a_columns_b_rows: 3,
            b_columns: 4,
            latency: 1,
            ports: MultiplierPorts::prefixed(),
        };

        let dut = MatrixMultiplier::new(params.clone()).unwrap();
        let sim = Simulator::new(SimulationConfig::for_simulator("verilator"), Box::new(dut))
            .unwrap();
        let c = sim.signals().port("o_C").unwrap();
        assert_eq!(c.shape, PortShape::Matrix { rows: 2, cols: 4 });
        assert_eq!(c.width, 18);

        let dut = MatrixMultiplier::new(params).unwrap();
        let sim =
            Simulator::new(SimulationConfig::for_simulator("icarus"), Box::new(dut)).unwrap();
        assert!(!sim.capabilities().multi_dimensional_arrays);
        assert_eq!(
            sim.signals().port("i_A").unwrap().shape,
            PortShape::Array { len: 6 }
        );
    }
}
