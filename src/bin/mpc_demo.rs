//! Closed-loop MPC path tracking demo
//!
//! Drives a simulated vehicle along a curved polynomial reference and plots
//! the traveled path against it. The plant keeps executing the previous
//! command during the actuation delay, which is what the controller's latency
//! projection assumes.
//!
//! Run with: cargo run --bin mpc_demo

use gnuplot::{AxesCommon, Caption, Color, Figure, PointSize, PointSymbol};
use mpc_tracking::model::{normalize_angle, polyval, polyval_deriv, BicycleModel};
use mpc_tracking::{MpcConfig, MpcController, VehicleState};

const SIM_STEPS: usize = 200;

fn main() {
    env_logger::init();
    println!("MPC path tracking demo start!");

    // gentle S-curve reference, y = f(x)
    let coeffs = [0.0, 0.0, 0.015, -0.0001];

    let mut config = MpcConfig::default();
    config.target_speed = 12.0;
    config.latency = 0.1;
    let dt = config.dt;
    let latency = config.latency;
    let plant = BicycleModel::new(config.lf);

    let mut controller = MpcController::new(config).expect("valid configuration");

    // plant state: x, y, heading, speed
    let (mut x, mut y, mut psi, mut v) = (0.0, -1.0, 0.0, 0.0);
    let mut last_u = [0.0, 0.0];

    let mut path_x = vec![x];
    let mut path_y = vec![y];
    let mut speed_hist = vec![v];
    let mut steer_hist: Vec<f64> = Vec::new();
    let mut fallback_count = 0;

    for step in 0..SIM_STEPS {
        // the telemetry glue computes the tracking errors in the shared frame
        let cte = polyval(&coeffs, x) - y;
        let epsi = normalize_angle(psi - polyval_deriv(&coeffs, x).atan());
        let state = VehicleState::new(x, y, psi, v, cte, epsi);

        let solution = controller
            .solve(&state, &coeffs)
            .expect("well-formed demo input");
        if solution.fallback {
            fallback_count += 1;
        }

        // previous command keeps acting until the new one arrives
        let u = [solution.actuation.steer, solution.actuation.accel];
        let before = [x, y, psi, v, cte, epsi];
        let at_actuation = plant.step_f64(&before, &last_u, &coeffs, latency);
        let next = plant.step_f64(&at_actuation, &u, &coeffs, dt);
        x = next[0];
        y = next[1];
        psi = normalize_angle(next[2]);
        v = next[3];
        last_u = u;

        path_x.push(x);
        path_y.push(y);
        speed_hist.push(v);
        steer_hist.push(solution.actuation.steer);

        if step % 25 == 0 {
            println!(
                "step {:3}: pos=({:6.2}, {:6.2}), v={:5.2} m/s, cte={:6.3}, steer={:6.3}",
                step, x, y, v, cte, solution.actuation.steer
            );
        }
    }

    let final_cte = polyval(&coeffs, x) - y;
    println!("\nSimulation finished");
    println!(
        "Final position: ({:.2}, {:.2}), speed {:.2} m/s, cte {:.3}",
        x, y, v, final_cte
    );
    if fallback_count > 0 {
        println!("Degraded cycles (fallback actuation): {}", fallback_count);
    }

    // reference curve for plotting
    let x_max = path_x.iter().cloned().fold(1.0_f64, f64::max);
    let ref_x: Vec<f64> = (0..=(x_max.ceil() as usize)).map(|i| i as f64).collect();
    let ref_y: Vec<f64> = ref_x.iter().map(|&rx| polyval(&coeffs, rx)).collect();

    let mut fig = Figure::new();
    fig.axes2d()
        .set_title("MPC Path Tracking", &[])
        .set_x_label("x [m]", &[])
        .set_y_label("y [m]", &[])
        .lines(&ref_x, &ref_y, &[Caption("Reference"), Color("gray")])
        .lines(&path_x, &path_y, &[Caption("Trajectory"), Color("blue")])
        .points(
            &[path_x[0]],
            &[path_y[0]],
            &[Caption("Start"), Color("red"), PointSymbol('O'), PointSize(2.0)],
        );

    if let Err(e) = fig.save_to_svg("./img/mpc_demo.svg", 800, 600) {
        eprintln!("Failed to save plot: {}", e);
    } else {
        println!("Plot saved to ./img/mpc_demo.svg");
    }

    // speed and steering history
    let time: Vec<f64> = (0..speed_hist.len()).map(|i| i as f64 * dt).collect();
    let steer_time: Vec<f64> = (1..=steer_hist.len()).map(|i| i as f64 * dt).collect();

    let mut fig_control = Figure::new();
    fig_control
        .axes2d()
        .set_title("MPC Control History", &[])
        .set_x_label("Time [s]", &[])
        .set_y_label("Speed [m/s] / Steering [rad]", &[])
        .lines(&time, &speed_hist, &[Caption("Speed"), Color("blue")])
        .lines(&steer_time, &steer_hist, &[Caption("Steering"), Color("red")]);

    if let Err(e) = fig_control.save_to_svg("./img/mpc_demo_control.svg", 800, 600) {
        eprintln!("Failed to save control plot: {}", e);
    } else {
        println!("Control plot saved to ./img/mpc_demo_control.svg");
    }

    println!("Done!");
}
