//! Surface definitions: ordered sections with a fixed sampling layout.

use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::model::PartAxis;
use crate::reference::{GridSurface, ReferenceGeometry};
use crate::sample::{self, GenerationMode, PickMode, SamplingParams, Section};

/// Geometric role of a surface in the blade model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Pressure side of the blade.
    ASide,
    /// Suction side of the blade.
    BSide,
    /// Leading-edge blend.
    LeadingEdge,
    /// Trailing-edge blend.
    TrailingEdge,
    /// Inner rotational boundary.
    Hub,
    /// Outer rotational boundary.
    Shroud,
    /// Blade-to-hub (or shroud) fillet.
    Fillet,
}

/// A surface kind on the main blade or its splitter counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceRole {
    /// Geometric role.
    pub kind: SurfaceKind,
    /// True for the splitter blade.
    pub splitter: bool,
}

impl SurfaceRole {
    /// Role on the main blade.
    pub const fn main(kind: SurfaceKind) -> Self {
        Self {
            kind,
            splitter: false,
        }
    }

    /// Role on the splitter blade.
    pub const fn splitter(kind: SurfaceKind) -> Self {
        Self {
            kind,
            splitter: true,
        }
    }

    /// Same kind on the other blade of the pair.
    pub fn with_kind(self, kind: SurfaceKind) -> Self {
        Self { kind, ..self }
    }
}

impl std::fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.splitter {
            write!(f, "splitter {:?}", self.kind)
        } else {
            write!(f, "{:?}", self.kind)
        }
    }
}

/// Where new sections for a definition come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSource {
    /// The picked geometry.
    pub reference: ReferenceGeometry,
    /// How it was picked.
    pub pick: PickMode,
}

/// An ordered collection of sections describing one surface.
///
/// Sections are stored hub first with chord direction leading edge to
/// trailing edge. Once any section exists the point count and spacing are
/// frozen until [`clear_sections`](Self::clear_sections) is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDefinition {
    role: SurfaceRole,
    generation: GenerationMode,
    reversed: bool,
    sampling: SamplingParams,
    sections: Vec<Section>,
    source: Option<SectionSource>,
}

impl SurfaceDefinition {
    /// Empty definition for a role.
    pub fn new(role: SurfaceRole) -> Self {
        Self {
            role,
            generation: GenerationMode::default(),
            reversed: false,
            sampling: SamplingParams::default(),
            sections: Vec::new(),
            source: None,
        }
    }

    /// Definition from explicit sections.
    ///
    /// When `reversed` is set the input runs trailing edge to leading
    /// edge and is flipped into the stored orientation.
    pub fn define(role: SurfaceRole, sections: Vec<Section>, reversed: bool) -> Result<Self> {
        let mut def = Self::new(role);
        if let Some(first) = sections.first() {
            def.sampling.points_per_section = first.len();
        }
        def.reversed = reversed;
        for section in sections {
            let section = if reversed { section.reversed() } else { section };
            def.push_section(section)?;
        }
        Ok(def)
    }

    /// Attach picked geometry for later re-sampling.
    pub fn with_source(mut self, reference: ReferenceGeometry, pick: PickMode) -> Self {
        self.source = Some(SectionSource { reference, pick });
        self
    }

    /// Set the generation mode.
    pub fn with_generation(mut self, generation: GenerationMode) -> Self {
        self.generation = generation;
        self
    }

    /// Role of this definition.
    pub fn role(&self) -> SurfaceRole {
        self.role
    }

    /// Generation mode.
    pub fn generation(&self) -> GenerationMode {
        self.generation
    }

    /// Whether the source runs opposite to the stored orientation.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Sampling layout.
    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    /// Sections, hub first.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Picked source geometry, if any.
    pub fn source(&self) -> Option<&SectionSource> {
        self.source.as_ref()
    }

    /// Whether [`sample_at`](Self::sample_at) can produce new sections.
    pub fn can_resample(&self, has_rebuilt: bool) -> bool {
        match self.generation {
            GenerationMode::IsoRebuilt => has_rebuilt,
            _ => self.source.is_some(),
        }
    }

    /// Change the sampling layout.
    ///
    /// Fails with [`GeomError::StaleDefinition`] if sections exist and the
    /// layout differs.
    pub fn configure_sampling(&mut self, params: SamplingParams) -> Result<()> {
        if params == self.sampling {
            return Ok(());
        }
        if !self.sections.is_empty() {
            let reason = if params.points_per_section != self.sampling.points_per_section {
                format!(
                    "points per section changed from {} to {} with {} sections present",
                    self.sampling.points_per_section,
                    params.points_per_section,
                    self.sections.len()
                )
            } else {
                format!(
                    "spacing changed from {:?} to {:?} with {} sections present",
                    self.sampling.spacing,
                    params.spacing,
                    self.sections.len()
                )
            };
            return Err(GeomError::StaleDefinition {
                role: self.role.to_string(),
                reason,
            });
        }
        self.sampling = params;
        Ok(())
    }

    /// Drop all sections, unfreezing the sampling layout.
    pub fn clear_sections(&mut self) {
        self.sections.clear();
    }

    /// Append a section, keeping sections ordered by station.
    pub fn push_section(&mut self, section: Section) -> Result<()> {
        if section.len() != self.sampling.points_per_section {
            if self.sections.is_empty() {
                self.sampling.points_per_section = section.len();
            } else {
                return Err(GeomError::StaleDefinition {
                    role: self.role.to_string(),
                    reason: format!(
                        "section at station {} has {} points, definition uses {}",
                        section.station,
                        section.len(),
                        self.sampling.points_per_section
                    ),
                });
            }
        }
        let at = self
            .sections
            .partition_point(|s| s.station <= section.station);
        self.sections.insert(at, section);
        Ok(())
    }

    /// Flip the chord direction of every section and toggle the flag.
    pub fn reverse(&mut self) {
        self.reversed = !self.reversed;
        for section in &mut self.sections {
            *section = section.reversed();
        }
    }

    /// Sample a new section at `station` without modifying the definition.
    ///
    /// `rebuilt` is this role's last rebuilt surface, needed by
    /// [`GenerationMode::IsoRebuilt`].
    pub fn sample_at(
        &self,
        station: f64,
        axis: &PartAxis,
        rebuilt: Option<&GridSurface>,
    ) -> Result<Section> {
        if self.generation == GenerationMode::IsoRebuilt {
            let grid = rebuilt.ok_or_else(|| {
                GeomError::InsufficientDefinition(format!(
                    "{} samples the rebuilt surface but the model was never rebuilt",
                    self.role
                ))
            })?;
            // The rebuilt surface is already in stored orientation.
            return sample::sample_iso(grid, station, &self.sampling);
        }
        let source = self.source.as_ref().ok_or_else(|| {
            GeomError::InsufficientDefinition(format!("{} has no picked source geometry", self.role))
        })?;
        let section = match self.generation {
            GenerationMode::IsoSource | GenerationMode::IsoRebuilt => {
                sample::sample(&source.reference, source.pick, station, &self.sampling)?
            }
            GenerationMode::RotatingIntersection => match &source.reference {
                ReferenceGeometry::Surface { grid } => {
                    sample::sample_revolution(grid, axis, station, &self.sampling)?
                }
                ReferenceGeometry::Curves { .. } => {
                    return Err(GeomError::TopologyExtraction {
                        station,
                        reason: "rotating intersection needs a surface reference".into(),
                    })
                }
            },
        };
        Ok(if self.reversed {
            section.reversed()
        } else {
            section
        })
    }

    /// Sample at `station` and append the section.
    ///
    /// On failure the definition is unchanged.
    pub fn add_sample(
        &mut self,
        station: f64,
        axis: &PartAxis,
        rebuilt: Option<&GridSurface>,
    ) -> Result<&Section> {
        let section = self.sample_at(station, axis, rebuilt)?;
        self.push_section(section)?;
        let idx = self
            .sections
            .iter()
            .rposition(|s| s.station == station)
            .unwrap_or(self.sections.len() - 1);
        Ok(&self.sections[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Polyline;
    use crate::sample::SpacingMode;
    use bladecam_kernel_math::{Dir3, Point3, Vec3};
    use proptest::prelude::*;

    fn section(station: f64, n: usize) -> Section {
        Section::new(
            station,
            (0..n)
                .map(|i| Point3::new(i as f64, 0.0, station * 10.0))
                .collect(),
        )
    }

    fn axis() -> PartAxis {
        PartAxis::new(Point3::origin(), Dir3::new_normalize(Vec3::z()))
    }

    #[test]
    fn test_define_keeps_sections_ordered() {
        let def = SurfaceDefinition::define(
            SurfaceRole::main(SurfaceKind::BSide),
            vec![section(1.0, 4), section(0.0, 4), section(0.5, 4)],
            false,
        )
        .unwrap();
        let stations: Vec<f64> = def.sections().iter().map(|s| s.station).collect();
        assert_eq!(stations, vec![0.0, 0.5, 1.0]);
        assert_eq!(def.sampling().points_per_section, 4);
    }

    #[test]
    fn test_mismatched_point_count_rejected() {
        let err = SurfaceDefinition::define(
            SurfaceRole::main(SurfaceKind::ASide),
            vec![section(0.0, 4), section(1.0, 5)],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, GeomError::StaleDefinition { .. }));
    }

    #[test]
    fn test_changing_points_after_sections_is_stale() {
        let mut def =
            SurfaceDefinition::define(SurfaceRole::main(SurfaceKind::ASide), vec![section(0.0, 4)], false)
                .unwrap();
        let err = def
            .configure_sampling(SamplingParams::new(8, SpacingMode::EvenlySpaced))
            .unwrap_err();
        assert!(matches!(err, GeomError::StaleDefinition { .. }));
        // Spacing is frozen too.
        let err = def
            .configure_sampling(SamplingParams::new(4, SpacingMode::SurfaceParameter))
            .unwrap_err();
        assert!(matches!(err, GeomError::StaleDefinition { .. }));

        def.clear_sections();
        def.configure_sampling(SamplingParams::new(8, SpacingMode::SurfaceParameter))
            .unwrap();
        assert_eq!(def.sampling().points_per_section, 8);
    }

    #[test]
    fn test_reversed_input_is_normalized() {
        let forward = section(0.0, 5);
        let def = SurfaceDefinition::define(
            SurfaceRole::main(SurfaceKind::ASide),
            vec![forward.reversed()],
            true,
        )
        .unwrap();
        assert!(def.is_reversed());
        assert_eq!(def.sections()[0].points, forward.points);
    }

    #[test]
    fn test_failed_sample_leaves_definition_untouched() {
        let curves = vec![Polyline::new(vec![Point3::origin(), Point3::new(4.0, 0.0, 0.0)])];
        let mut def = SurfaceDefinition::new(SurfaceRole::main(SurfaceKind::BSide))
            .with_source(ReferenceGeometry::Curves { curves }, PickMode::Surface);
        let before = def.clone();
        assert!(matches!(
            def.add_sample(0.5, &axis(), None),
            Err(GeomError::TopologyExtraction { .. })
        ));
        assert_eq!(def, before);
    }

    #[test]
    fn test_iso_rebuilt_requires_rebuild() {
        let grid = GridSurface::new(vec![
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0)],
        ])
        .unwrap();
        let def = SurfaceDefinition::new(SurfaceRole::main(SurfaceKind::BSide))
            .with_source(ReferenceGeometry::Surface { grid: grid.clone() }, PickMode::Surface)
            .with_generation(GenerationMode::IsoRebuilt);
        assert!(matches!(
            def.sample_at(0.5, &axis(), None),
            Err(GeomError::InsufficientDefinition(_))
        ));
        assert!(def.sample_at(0.5, &axis(), Some(&grid)).is_ok());
    }

    proptest! {
        #[test]
        fn prop_sections_share_point_count(counts in proptest::collection::vec(2usize..6, 1..6)) {
            let mut def = SurfaceDefinition::new(SurfaceRole::main(SurfaceKind::ASide));
            for (i, n) in counts.iter().enumerate() {
                let _ = def.push_section(section(i as f64 / 10.0, *n));
            }
            let first = def.sections()[0].len();
            prop_assert!(def.sections().iter().all(|s| s.len() == first));
        }

        #[test]
        fn prop_double_reversal_is_identity(
            coords in proptest::collection::vec((-100.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0), 2..12)
        ) {
            let points: Vec<Point3> = coords.iter().map(|(x, y, z)| Point3::new(*x, *y, *z)).collect();
            let mut sec = Section::new(0.3, points);
            sec.tangents = Some(vec![Vec3::x(); sec.len()]);
            let mut def = SurfaceDefinition::define(
                SurfaceRole::main(SurfaceKind::BSide),
                vec![sec],
                false,
            ).unwrap();
            let original = def.sections().to_vec();
            def.reverse();
            def.reverse();
            prop_assert_eq!(def.sections(), &original[..]);
            prop_assert!(!def.is_reversed());
        }
    }
}
