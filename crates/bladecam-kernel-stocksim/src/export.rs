//! Delimited export of simulation steps.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::simulation::SimulationStep;
use crate::Result;

/// One CSV row.
#[derive(Debug, Serialize)]
struct StepRow<'a> {
    step: usize,
    time: f64,
    kind: String,
    debris_thickness: f64,
    contact_area: f64,
    volume_removal_rate: f64,
    axial_depth: f64,
    radial_width: f64,
    feed_per_minute: f64,
    feed_per_rev: f64,
    feed_per_tooth: f64,
    spindle_rpm: f64,
    surface_speed: f64,
    removed_volume: f64,
    status: &'a str,
}

impl<'a> From<&'a SimulationStep> for StepRow<'a> {
    fn from(s: &'a SimulationStep) -> Self {
        let k = &s.kinematics;
        Self {
            step: s.index,
            time: s.start_time + s.duration,
            kind: format!("{:?}", s.kind),
            debris_thickness: s.debris_thickness,
            contact_area: s.contact_area,
            volume_removal_rate: s.volume_removal_rate,
            axial_depth: s.axial_depth,
            radial_width: s.radial_width,
            feed_per_minute: k.feed_per_minute,
            feed_per_rev: k.feed_per_rev,
            feed_per_tooth: k.feed_per_tooth,
            spindle_rpm: k.spindle_rpm,
            surface_speed: k.surface_speed,
            removed_volume: s.removed_volume,
            status: s.status.label(),
        }
    }
}

/// Write steps as CSV with a header row.
pub fn write_csv<W: Write>(steps: &[SimulationStep], writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for step in steps {
        out.serialize(StepRow::from(step))?;
    }
    out.flush()?;
    Ok(())
}

/// Write steps to a CSV file at `path`.
pub fn export_csv(steps: &[SimulationStep], path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    write_csv(steps, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::StepStatus;
    use bladecam_kernel_cam::{Kinematics, MotionKind};

    fn step(index: usize) -> SimulationStep {
        SimulationStep {
            index,
            kind: MotionKind::Cut,
            start_time: 0.5,
            duration: 0.25,
            removed_volume: 12.0,
            remaining_volume: 100.0,
            contact_area: 2.0,
            debris_thickness: 0.4,
            volume_removal_rate: 48.0,
            axial_depth: 1.0,
            radial_width: 2.0,
            status: StepStatus::Overcut,
            collision_point: None,
            overcut_depth: 0.1,
            kinematics: Kinematics {
                feed_per_minute: 1000.0,
                feed_per_rev: 0.1,
                feed_per_tooth: 0.05,
                spindle_rpm: 10000.0,
                surface_speed: 125.6,
            },
        }
    }

    #[test]
    fn test_write_csv() {
        let mut buf = Vec::new();
        write_csv(&[step(0), step(1)], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("step,time,kind,debris_thickness,contact_area"));
        assert!(lines[1].starts_with("0,0.75,Cut,0.4,2.0"));
        assert!(lines[2].ends_with(",overcut"));
    }
}
