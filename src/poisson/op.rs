use std::sync::Arc;
use rayon::prelude::*;
use crate::bc::{BcHolder, EbBc};
use crate::eb::VolIndex;
use crate::grid_array::GridArray;
use crate::index_space::{Axis, IndexSpace, Side};
use crate::level_data::{gather_partials, BoxPartial, LevelData};
use crate::level_geometry::{CellStencil, LevelGeometry, VofStencil};
use crate::problem_domain::ProblemDomain;
use crate::solver::{AmrLevelOp, Assemble, LinearOp, MgLevelOp};
use super::data::{BoxValues, BoxValuesMut, EbLevelData};




/// Ghost width of the coarse buffer used for coarse-fine interpolation:
/// one cell for the coarse cell under the ghost and one for its slope.
const COARSE_GHOST: i64 = 2;

/// Relative size below which a diagonal is treated as zero and the volume
/// is not relaxed.
const MIN_DIAGONAL: f64 = 1e-12;




/// Per-box relaxation coefficients. `gain` holds, for each ghost cell next
/// to the valid region, the derivative of the filled ghost value with
/// respect to the valid cell across the face: from the domain boundary
/// condition, or 1/3 at a coarse-fine face.
///
#[derive(Clone, Debug)]
struct BoxCoefficients {
    gain: GridArray,
    diagonal: Vec<f64>,
}




/// `L(phi) = alpha kappa phi + beta kappa div(grad phi)` on an embedded
/// boundary level, in conservative form: face fluxes are weighted by area
/// fractions and the result is the volume-weighted divergence, so the
/// right-hand side must be weighted by the volume fraction as well.
///
/// Ghost cells are filled before the operator is evaluated: first from other
/// boxes, then at coarse-fine faces from the coarser level's solution, then
/// across the physical domain boundary.
///
#[derive(Clone, Debug)]
pub struct EbPoissonOp {
    geom: Arc<LevelGeometry>,
    alpha: f64,
    beta: f64,
    bc: BcHolder,
    eb_bc: EbBc,
    coefficients: Vec<Option<BoxCoefficients>>,
}




// ============================================================================
impl EbPoissonOp {

    pub fn new(geom: Arc<LevelGeometry>, alpha: f64, beta: f64, bc: BcHolder, eb_bc: EbBc) -> Self {
        let mut op = Self { geom, alpha, beta, bc, eb_bc, coefficients: Vec::new() };
        let layout = op.geom.layout().clone();

        op.coefficients = (0..layout.len())
            .into_par_iter()
            .map(|n| if layout.is_local(n) { Some(op.box_coefficients(n)) } else { None })
            .collect();
        op
    }

    pub fn geometry(&self) -> &Arc<LevelGeometry> {
        &self.geom
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn domain(&self) -> &ProblemDomain {
        self.geom.layout().domain()
    }

    fn dx2(&self) -> f64 {
        self.geom.dx() * self.geom.dx()
    }

    fn coefficients(&self, index: usize) -> &BoxCoefficients {
        match &self.coefficients[index] {
            Some(c) => c,
            None => panic!("EbPoissonOp - box {} is not local", index),
        }
    }

    fn box_coefficients(&self, index: usize) -> BoxCoefficients {
        let valid = self.geom.layout().get(index);
        let bg = self.geom.get(index);
        let mut gain = GridArray::zeros(valid.extend_all(1), 1);
        let mut impulse = GridArray::zeros(valid.extend_all(self.geom.ghost()), 1);

        for axis in Axis::ALL {
            for side in Side::ALL {
                if !self.domain().is_physical_boundary(valid, axis, side) {
                    continue;
                }
                let slab = valid.adjacent(axis, side, 1);
                impulse.fill(0.0);

                for ghost in slab.iter() {
                    impulse.set(axis.step(ghost, -side.sign()), 1.0)
                }
                self.bc.apply(&mut impulse, valid, self.domain(), self.geom.dx(), true, index);

                for ghost in slab.iter() {
                    gain.set(ghost, impulse.get(ghost))
                }
            }
        }
        for face in &bg.cf {
            gain.set(face.ghost, 1.0 / 3.0)
        }

        let eb_dirichlet = self.eb_bc.is_dirichlet();
        let diagonal = bg.vofs.iter().map(|s| {
            let faces: f64 = s.faces.iter().map(|(o, a)| a * (1.0 - gain.get(o.cell))).sum();
            let eb = if eb_dirichlet { s.eb_area / s.eb_distance } else { 0.0 };
            self.alpha * s.kappa - self.beta * (faces + eb) / self.dx2()
        }).collect();

        BoxCoefficients { gain, diagonal }
    }

    fn regular_diagonal(&self, gain: &GridArray, cell: (i64, i64)) -> f64 {
        let faces: f64 = neighbors(cell).map(|n| 1.0 - gain.get(n)).sum();
        self.alpha - self.beta * faces / self.dx2()
    }

    fn is_negligible(&self, diagonal: f64) -> bool {
        diagonal.abs() < MIN_DIAGONAL * (self.alpha.abs() + self.beta.abs() / self.dx2())
    }

    fn regular_op(&self, phi: &BoxValues, cell: (i64, i64)) -> f64 {
        let p = phi.fab.get(cell);
        let laplacian: f64 = neighbors(cell).map(|n| phi.fab.get(n) - p).sum();
        self.alpha * p + self.beta * laplacian / self.dx2()
    }

    fn general_op(&self, phi: &BoxValues, s: &VofStencil, homogeneous: bool) -> f64 {
        let p = phi.value(s.vof);
        let flux: f64 = s.faces.iter().map(|(o, a)| a * (phi.value(*o) - p)).sum();
        let g = self.eb_bc.value(homogeneous);
        let eb = match self.eb_bc {
            EbBc::Dirichlet(_) => s.eb_area * (g - p) / (s.eb_distance * self.dx2()),
            EbBc::Neumann(_) => s.eb_area * g / self.geom.dx(),
        };
        self.alpha * s.kappa * p + self.beta * (flux / self.dx2() + eb)
    }

    /// Fill every ghost cell the stencils read.
    ///
    fn fill_ghosts(&self, phi: &mut EbLevelData, phi_coarse: Option<&EbLevelData>, homogeneous: bool) {
        phi.exchange();
        self.fill_coarse_fine(phi, if homogeneous { None } else { phi_coarse });

        let layout = self.geom.layout().clone();
        let dx = self.geom.dx();

        for n in layout.local_indexes() {
            let (fab, _) = phi.box_mut(n);
            self.bc.apply(fab, layout.get(n), layout.domain(), dx, homogeneous, n)
        }
    }

    /// Set each coarse-fine ghost cell to `phi_inside / 3 + 2 phi_c / 3`,
    /// where `phi_c` is the coarse solution under the ghost cell, corrected by
    /// its tangential slope. Without coarse data `phi_c` is zero.
    ///
    fn fill_coarse_fine(&self, phi: &mut EbLevelData, phi_coarse: Option<&EbLevelData>) {
        let coarse = match (self.geom.coarse_link(), phi_coarse) {
            (Some(link), Some(c)) => {
                let mut buffer = LevelData::new(link.coarsened_fine.clone(), 1, COARSE_GHOST);
                c.level_data().copy_to_ghosted(&mut buffer);
                Some((link.ratio, buffer))
            }
            _ => None,
        };

        for n in self.geom.layout().local_indexes() {
            let cf = &self.geom.get(n).cf;

            if cf.is_empty() {
                continue;
            }
            let (fab, multi) = phi.box_mut(n);
            let mut values = BoxValuesMut { fab, multi };

            for face in cf {
                let interpolated = match &coarse {
                    Some((ratio, buffer)) => {
                        interpolate_coarse(buffer.get(n), buffer.layout().domain(), face.ghost, face.axis.other(), *ratio)
                    }
                    None => 0.0,
                };
                let inside = values.value(VolIndex::new(face.inside, 0));
                values.set_cell(face.ghost, inside / 3.0 + 2.0 * interpolated / 3.0)
            }
        }
    }

    /// Evaluate `L(phi)`, or `rhs - L(phi)` when `rhs` is given, into
    /// `result`. The ghost cells of `phi` must already be filled.
    ///
    fn evaluate(&self, result: &mut EbLevelData, phi: &EbLevelData, rhs: Option<&EbLevelData>, homogeneous: bool) {
        let (fabs, multi) = result.parts_mut();

        fabs.par_iter_mut()
            .zip(multi.par_iter_mut())
            .enumerate()
            .for_each(|(n, (fab, multi))| {
                let fab = match fab {
                    Some(fab) => fab,
                    None => return,
                };
                let mut out = BoxValuesMut { fab, multi };
                let values = phi.values(n);
                let rhs = rhs.map(|r| r.values(n));
                let bg = self.geom.get(n);

                for cell in bg.valid.iter() {
                    match bg.cell(cell) {
                        CellStencil::Covered => out.set_cell(cell, 0.0),
                        CellStencil::Regular => {
                            let l = self.regular_op(&values, cell);
                            let vof = VolIndex::new(cell, 0);
                            out.set(vof, rhs.map_or(l, |r| r.value(vof) - l))
                        }
                        CellStencil::General(range) => {
                            for s in &bg.vofs[range.clone()] {
                                let l = self.general_op(&values, s, homogeneous);
                                out.set(s.vof, rhs.map_or(l, |r| r.value(s.vof) - l))
                            }
                        }
                    }
                }
            })
    }

    /// Red-black Gauss-Seidel. The ghost cells are refilled before each
    /// color, and all volumes of a cell are updated together.
    ///
    fn gsrb(
        &self,
        phi: &mut EbLevelData,
        phi_coarse: Option<&EbLevelData>,
        rhs: &EbLevelData,
        homogeneous: bool,
        iterations: usize)
    {
        for _ in 0..iterations {
            for color in 0..2 {
                self.fill_ghosts(phi, phi_coarse, homogeneous);

                let (fabs, multi) = phi.parts_mut();

                fabs.par_iter_mut()
                    .zip(multi.par_iter_mut())
                    .enumerate()
                    .for_each(|(n, (fab, multi))| {
                        if let Some(fab) = fab {
                            self.relax_box(n, color, BoxValuesMut { fab, multi }, rhs.values(n), homogeneous)
                        }
                    })
            }
        }
    }

    fn relax_box(&self, index: usize, color: i64, mut phi: BoxValuesMut, rhs: BoxValues, homogeneous: bool) {
        let bg = self.geom.get(index);
        let coefficients = self.coefficients(index);
        let mut updates = Vec::new();

        for cell in bg.valid.iter().filter(|c| (c.0 + c.1).rem_euclid(2) == color) {
            match bg.cell(cell) {
                CellStencil::Covered => {}
                CellStencil::Regular => {
                    let diagonal = self.regular_diagonal(&coefficients.gain, cell);

                    if !self.is_negligible(diagonal) {
                        let l = self.regular_op(&phi.values(), cell);
                        let vof = VolIndex::new(cell, 0);
                        phi.set(vof, phi.value(vof) + (rhs.value(vof) - l) / diagonal)
                    }
                }
                CellStencil::General(range) => {
                    updates.clear();

                    for (k, s) in bg.vofs[range.clone()].iter().enumerate() {
                        let diagonal = coefficients.diagonal[range.start + k];

                        if !self.is_negligible(diagonal) {
                            let l = self.general_op(&phi.values(), s, homogeneous);
                            updates.push((s.vof, (rhs.value(s.vof) - l) / diagonal))
                        }
                    }
                    for &(vof, delta) in &updates {
                        phi.set(vof, phi.value(vof) + delta)
                    }
                }
            }
        }
    }

    /// `coarse = sum(residual) / 4` over the fine volumes of each coarse
    /// volume: the residuals are volume-weighted already.
    ///
    fn sum_down(&self, coarse: &mut EbLevelData, fine: &EbLevelData) {
        self.restrict_with(coarse, fine, |pairs| pairs.iter().map(|(_, r)| r).sum::<f64>() / 4.0)
    }

    /// Apply `reduce` to the (volume fraction, value) pairs of the fine
    /// volumes under each valid coarse volume.
    ///
    fn restrict_with<F>(&self, coarse: &mut EbLevelData, fine: &EbLevelData, reduce: F)
    where
        F: Fn(&[(f64, f64)]) -> f64 + Sync
    {
        let coarse_geom = coarse.geometry().clone();
        let fine_geom = fine.geometry().clone();

        if !coarse_geom.is_coarsening_of(&fine_geom) {
            panic!("EbPoissonOp::restrict - coarse data is not over the coarsened fine layout")
        }
        let (fabs, multi) = coarse.parts_mut();

        fabs.par_iter_mut()
            .zip(multi.par_iter_mut())
            .enumerate()
            .for_each(|(n, (fab, multi))| {
                let fab = match fab {
                    Some(fab) => fab,
                    None => return,
                };
                let mut out = BoxValuesMut { fab, multi };
                let values = fine.values(n);
                let coarse_ebis = coarse_geom.ebisl().get(n);
                let fine_ebis = fine_geom.ebisl().get(n);
                let mut pairs = Vec::with_capacity(4);

                for cell in coarse_geom.layout().get(n).iter() {
                    if coarse_ebis.is_regular(cell) {
                        pairs.clear();
                        pairs.extend(refined_cells(cell).map(|f| (1.0, values.fab.get(f))));
                        out.set(VolIndex::new(cell, 0), reduce(&pairs));
                        continue;
                    }
                    let vofs = coarse_ebis.vofs(cell);

                    if vofs.is_empty() {
                        out.set_cell(cell, 0.0);
                    }
                    for vof in vofs {
                        pairs.clear();
                        pairs.extend(coarse_geom
                            .ebisl()
                            .refine_vof(vof, 2, n)
                            .into_iter()
                            .map(|f| (fine_ebis.volume_fraction(f), values.value(f))));
                        out.set(vof, reduce(&pairs))
                    }
                }
            })
    }
}

fn neighbors(cell: (i64, i64)) -> impl Iterator<Item = (i64, i64)> {
    Axis::ALL.into_iter().flat_map(move |axis| Side::ALL.into_iter().map(move |side| axis.step(cell, side.sign())))
}

fn refined_cells(cell: (i64, i64)) -> impl Iterator<Item = (i64, i64)> {
    (0..4).map(move |k| (2 * cell.0 + k / 2, 2 * cell.1 + k % 2))
}

fn kappa_average(pairs: &[(f64, f64)]) -> f64 {
    let volume: f64 = pairs.iter().map(|(k, _)| k).sum();

    if volume > 0.0 {
        pairs.iter().map(|(k, v)| k * v).sum::<f64>() / volume
    } else {
        0.0
    }
}

/// The coarse value under a fine ghost cell, with a tangential slope
/// correction: central where both tangential neighbors are in the domain,
/// one-sided where only one is, none otherwise.
///
fn interpolate_coarse(coarse: &GridArray, domain: &ProblemDomain, ghost: (i64, i64), tangent: Axis, ratio: i64) -> f64 {
    let cell = (ghost.0.div_euclid(ratio), ghost.1.div_euclid(ratio));
    let hi = tangent.step(cell, 1);
    let lo = tangent.step(cell, -1);
    let center = coarse.get(cell);

    let slope = match (domain.image(lo).is_some(), domain.image(hi).is_some()) {
        (true, true) => 0.5 * (coarse.get(hi) - coarse.get(lo)),
        (false, true) => coarse.get(hi) - center,
        (true, false) => center - coarse.get(lo),
        (false, false) => 0.0,
    };
    let offset = (tangent.of(ghost).rem_euclid(ratio) as f64 + 0.5) / ratio as f64 - 0.5;
    center + slope * offset
}




// ============================================================================
impl LinearOp<EbLevelData> for EbPoissonOp {

    fn create(&self, prototype: &EbLevelData) -> EbLevelData {
        EbLevelData::new(prototype.geometry().clone())
    }

    fn assign(&self, dest: &mut EbLevelData, src: &EbLevelData) {
        dest.zip_apply(src, |d, s| *d = s)
    }

    fn incr(&self, dest: &mut EbLevelData, src: &EbLevelData, scale: f64) {
        dest.zip_apply(src, |d, s| *d += scale * s)
    }

    fn set_to_zero(&self, data: &mut EbLevelData) {
        data.set_val(0.0)
    }

    fn scale(&self, data: &mut EbLevelData, scale: f64) {
        data.map_values(|x| *x *= scale)
    }

    fn axby(&self, dest: &mut EbLevelData, x: &EbLevelData, y: &EbLevelData, a: f64, b: f64) {
        dest.zip_apply(x, |d, x| *d = a * x);
        dest.zip_apply(y, |d, y| *d += b * y)
    }

    fn dot(&self, a: &EbLevelData, b: &EbLevelData) -> f64 {
        a.check_same_geometry(b, "dot");

        let layout = self.geom.layout();
        let partials = layout
            .local_indexes()
            .into_par_iter()
            .map(|n| {
                let (va, vb) = (a.values(n), b.values(n));
                let sum = self.valid_vofs(n).map(|(_, vof)| va.value(vof) * vb.value(vof)).sum();
                BoxPartial { index: n, sum, volume: 0.0, max: 0.0 }
            })
            .collect();

        gather_partials(layout.comm().as_ref(), partials).iter().map(|p| p.sum).sum()
    }

    fn norm(&self, data: &EbLevelData, p: i32) -> f64 {
        assert!(p >= 0, "EbPoissonOp::norm - the exponent must be non-negative");

        let layout = self.geom.layout();
        let partials = layout
            .local_indexes()
            .into_par_iter()
            .map(|n| {
                let values = data.values(n);
                let mut partial = BoxPartial { index: n, sum: 0.0, volume: 0.0, max: 0.0 };

                for (kappa, vof) in self.valid_vofs(n) {
                    let v = values.value(vof).abs();
                    partial.max = partial.max.max(v);
                    partial.volume += kappa;

                    if p > 0 {
                        partial.sum += kappa * v.powi(p)
                    }
                }
                partial
            })
            .collect();

        let all = gather_partials(layout.comm().as_ref(), partials);

        if p == 0 {
            return all.iter().fold(0.0, |m, q| m.max(q.max));
        }
        let (sum, volume) = all.iter().fold((0.0, 0.0), |(s, v), q| (s + q.sum, v + q.volume));

        if volume > 0.0 {
            (sum / volume).powf(1.0 / p as f64)
        } else {
            0.0
        }
    }

    fn residual(&self, result: &mut EbLevelData, phi: &mut EbLevelData, rhs: &EbLevelData, homogeneous: bool) {
        self.fill_ghosts(phi, None, homogeneous);
        self.evaluate(result, phi, Some(rhs), homogeneous)
    }

    fn apply_op(&self, result: &mut EbLevelData, phi: &mut EbLevelData, homogeneous: bool) {
        self.apply_op_mg(result, phi, None, homogeneous)
    }
}

impl EbPoissonOp {

    /// The (volume fraction, volume) pairs of the uncovered valid volumes of
    /// a local box, in row-major cell order.
    ///
    fn valid_vofs(&self, index: usize) -> impl Iterator<Item = (f64, VolIndex)> + '_ {
        let bg = self.geom.get(index);

        bg.valid.iter().flat_map(move |cell| {
            let vofs: Vec<(f64, VolIndex)> = match bg.cell(cell) {
                CellStencil::Covered => Vec::new(),
                CellStencil::Regular => vec![(1.0, VolIndex::new(cell, 0))],
                CellStencil::General(range) => bg.vofs[range.clone()].iter().map(|s| (s.kappa, s.vof)).collect(),
            };
            vofs
        })
    }
}




// ============================================================================
impl MgLevelOp<EbLevelData> for EbPoissonOp {

    fn create_coarser(&self, fine: &EbLevelData, _ghosted: bool) -> EbLevelData {
        match fine.geometry().coarser() {
            Some(geom) => EbLevelData::new(geom),
            None => panic!("EbPoissonOp::create_coarser - the layout cannot be coarsened by two"),
        }
    }

    fn relax(&self, correction: &mut EbLevelData, residual: &EbLevelData, iterations: usize) {
        self.gsrb(correction, None, residual, true, iterations)
    }

    fn relax_nf(&self, phi: &mut EbLevelData, phi_coarse: Option<&EbLevelData>, rhs: &EbLevelData, iterations: usize) {
        self.gsrb(phi, phi_coarse, rhs, false, iterations)
    }

    fn restrict_residual(
        &self,
        res_coarse: &mut EbLevelData,
        phi: &mut EbLevelData,
        phi_coarse: Option<&EbLevelData>,
        rhs: &EbLevelData,
        homogeneous: bool)
    {
        let mut residual = self.create(rhs);
        self.fill_ghosts(phi, phi_coarse, homogeneous);
        self.evaluate(&mut residual, phi, Some(rhs), homogeneous);
        self.sum_down(res_coarse, &residual)
    }

    fn restrict_r(&self, coarse: &mut EbLevelData, fine: &EbLevelData) {
        self.restrict_with(coarse, fine, kappa_average)
    }

    fn prolong_increment(&self, phi: &mut EbLevelData, coarse: &mut EbLevelData) {
        coarse.exchange();

        let fine_geom = phi.geometry().clone();
        let coarse_geom = coarse.geometry().clone();

        if !coarse_geom.is_coarsening_of(&fine_geom) {
            panic!("EbPoissonOp::prolong_increment - coarse data is not over the coarsened fine layout")
        }
        let coarse_layout = coarse_geom.layout();
        let coarse_domain = coarse_layout.domain();
        let usable = |c: (i64, i64)| coarse_domain.image(c).is_some() && coarse_layout.covers(c);
        let coarse: &EbLevelData = coarse;
        let (fabs, multi) = phi.parts_mut();

        fabs.par_iter_mut()
            .zip(multi.par_iter_mut())
            .enumerate()
            .for_each(|(n, (fab, multi))| {
                let fab = match fab {
                    Some(fab) => fab,
                    None => return,
                };
                let mut out = BoxValuesMut { fab, multi };
                let values = coarse.values(n);
                let coarse_bg = coarse_geom.get(n);
                let fine_ebis = fine_geom.ebisl().get(n);

                for cell in fine_geom.layout().get(n).iter() {
                    let c = (cell.0.div_euclid(2), cell.1.div_euclid(2));

                    match coarse_bg.cell(c) {
                        CellStencil::Covered => {}
                        CellStencil::Regular => {
                            let center = values.fab.get(c);
                            let mut v = center;

                            for axis in Axis::ALL {
                                let (lo, hi) = (axis.step(c, -1), axis.step(c, 1));
                                let slope = match (usable(lo), usable(hi)) {
                                    (true, true) => 0.5 * (values.fab.get(hi) - values.fab.get(lo)),
                                    (false, true) => values.fab.get(hi) - center,
                                    (true, false) => center - values.fab.get(lo),
                                    (false, false) => 0.0,
                                };
                                let offset = (axis.of(cell).rem_euclid(2) as f64 + 0.5) / 2.0 - 0.5;
                                v += slope * offset
                            }
                            let vof = VolIndex::new(cell, 0);
                            out.set(vof, out.value(vof) + v)
                        }
                        CellStencil::General(_) => {
                            for vof in fine_ebis.vofs(cell) {
                                let coarse_vof = fine_geom.ebisl().coarsen_vof(vof, 2, n);
                                out.set(vof, out.value(vof) + values.value(coarse_vof))
                            }
                        }
                    }
                }
            })
    }

    fn apply_op_mg(&self, result: &mut EbLevelData, phi: &mut EbLevelData, phi_coarse: Option<&EbLevelData>, homogeneous: bool) {
        self.fill_ghosts(phi, phi_coarse, homogeneous);
        self.evaluate(result, phi, None, homogeneous)
    }
}




// ============================================================================
impl AmrLevelOp<EbLevelData> for EbPoissonOp {

    fn ref_to_coarser(&self) -> i64 {
        self.geom.coarse_link().map_or(1, |link| link.ratio)
    }

    fn average_down(&self, coarse: &mut EbLevelData, fine: &EbLevelData) {
        let link = match fine.geometry().coarse_link() {
            Some(link) => link,
            None => panic!("EbPoissonOp::average_down - the fine level has no coarser level"),
        };
        let ratio = link.ratio;
        let fine_geom = fine.geometry();
        let mut buffer = LevelData::new(link.coarsened_fine.clone(), 1, 0);

        for n in fine_geom.layout().local_indexes() {
            let values = fine.values(n);
            let ebis = fine_geom.ebisl().get(n);
            let target = buffer.get_mut(n);
            let region = target.space().clone();

            for c in region.iter() {
                let block = IndexSpace::new(
                    c.0 * ratio..(c.0 + 1) * ratio,
                    c.1 * ratio..(c.1 + 1) * ratio);
                let pairs: Vec<(f64, f64)> = block
                    .iter()
                    .flat_map(|f| ebis.vofs(f))
                    .map(|vof| (ebis.volume_fraction(vof), values.value(vof)))
                    .collect();
                target.set(c, kappa_average(&pairs))
            }
        }
        buffer.copy_to(coarse.level_data_mut());

        let coarse_layout = coarse.geometry().layout().clone();

        for n in coarse_layout.local_indexes() {
            let (fab, multi) = coarse.box_mut(n);
            let valid = coarse_layout.get(n);

            for (vof, v) in multi.iter_mut() {
                if valid.contains(vof.cell) && link.coarsened_fine.covers(vof.cell) {
                    *v = fab.get(vof.cell)
                }
            }
        }
    }
}




// ============================================================================
impl Assemble<EbLevelData> for EbPoissonOp {

    fn num_unknowns(&self, _data: &EbLevelData) -> usize {
        self.check_serial();
        (0..self.geom.layout().len()).map(|n| self.valid_vofs(n).count()).sum()
    }

    fn gather(&self, data: &EbLevelData) -> Vec<f64> {
        self.check_serial();
        (0..self.geom.layout().len())
            .flat_map(|n| {
                let values = data.values(n);
                self.valid_vofs(n).map(move |(_, vof)| values.value(vof))
            })
            .collect()
    }

    fn scatter(&self, data: &mut EbLevelData, values: &[f64]) {
        self.check_serial();
        let mut k = 0;

        for n in 0..self.geom.layout().len() {
            for (_, vof) in self.valid_vofs(n) {
                data.set(n, vof, values[k]);
                k += 1;
            }
        }
        assert_eq!(k, values.len(), "EbPoissonOp::scatter - wrong number of values");
    }
}

impl EbPoissonOp {
    fn check_serial(&self) {
        if self.geom.layout().comm().size() != 1 {
            panic!("EbPoissonOp::gather - assembly requires a single rank")
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use std::thread;
    use approx::assert_relative_eq;
    use crate::bc::{BcHolder, DomainBc, EbBc};
    use crate::eb::{AllRegular, Circle, CoarseningPolicy, Complement, EbIndexSpace, VolIndex};
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::level_geometry::LevelGeometry;
    use crate::message::{ChannelCommunicator, Communicator, SerialCommunicator};
    use crate::poisson::testing::{laplacian, unit_square};
    use crate::poisson::{EbLevelData, EbPoissonOpFactory};
    use crate::problem_domain::ProblemDomain;
    use crate::solver::{DirectSolver, LinearOp, MgLevelOp, MultiGrid};
    use super::EbPoissonOp;

    fn hole() -> Complement<Circle> {
        Complement(Circle { center: [0.5, 0.5], radius: 0.3 })
    }

    fn op(geom: Arc<LevelGeometry>) -> EbPoissonOp {
        EbPoissonOp::new(geom, 0.0, 1.0, BcHolder::from(DomainBc::dirichlet(0.0)), EbBc::Dirichlet(0.0))
    }

    fn integral(op: &EbPoissonOp, data: &EbLevelData) -> f64 {
        let dx2 = op.geometry().dx() * op.geometry().dx();
        op.geometry()
            .layout()
            .local_indexes()
            .into_iter()
            .flat_map(|n| op.valid_vofs(n).map(move |(kappa, vof)| (n, kappa, vof)).collect::<Vec<_>>())
            .map(|(n, kappa, vof)| kappa * data.get(n, vof) * dx2)
            .sum()
    }

    #[test]
    fn regular_operator_is_exact_for_quadratics() {
        let geom = unit_square(16, 8, &AllRegular);
        let op = op(geom.clone());
        let mut phi = EbLevelData::from_function(geom.clone(), |[x, y]| x * x + 3.0 * y * y);
        let mut result = op.create(&phi);
        op.apply_op(&mut result, &mut phi, false);

        for cell in range2d(1..15, 1..15).iter() {
            let n = geom.layout().find(cell).unwrap();
            assert_relative_eq!(result.get(n, VolIndex::new(cell, 0)), 8.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn covered_cells_are_zeroed() {
        let geom = unit_square(16, 8, &hole());
        let op = op(geom.clone());
        let mut phi = EbLevelData::from_function(geom.clone(), |_| 1.0);
        let mut result = op.create(&phi);
        op.apply_op(&mut result, &mut phi, false);

        let n = geom.layout().find((8, 8)).unwrap();
        assert_eq!(result.get(n, VolIndex::new((8, 8), 0)), 0.0);
    }

    #[test]
    fn restriction_conserves_the_volume_weighted_integral() {
        let fine_geom = unit_square(16, 8, &hole());
        let coarse_geom = fine_geom.coarser().unwrap();
        let fine_op = op(fine_geom.clone());
        let coarse_op = op(coarse_geom.clone());

        let fine = EbLevelData::from_function(fine_geom, |[x, y]| 1.0 + x * y);
        let mut coarse = EbLevelData::new(coarse_geom);
        fine_op.restrict_r(&mut coarse, &fine);

        assert_relative_eq!(integral(&coarse_op, &coarse), integral(&fine_op, &fine), epsilon = 1e-12);
    }

    #[test]
    fn prolongation_reproduces_linear_functions() {
        let fine_geom = unit_square(16, 8, &AllRegular);
        let coarse_geom = fine_geom.coarser().unwrap();
        let op = op(fine_geom.clone());
        let linear = |[x, y]: [f64; 2]| x + 2.0 * y;

        let mut coarse = EbLevelData::from_function(coarse_geom, linear);
        let mut phi = EbLevelData::new(fine_geom.clone());
        op.prolong_increment(&mut phi, &mut coarse);

        let expected = EbLevelData::from_function(fine_geom.clone(), linear);
        for cell in range2d(0..16, 0..16).iter() {
            let n = fine_geom.layout().find(cell).unwrap();
            let vof = VolIndex::new(cell, 0);
            assert_relative_eq!(phi.get(n, vof), expected.get(n, vof), epsilon = 1e-12);
        }
    }

    #[test]
    fn coarse_fine_ghosts_interpolate_along_the_interface() {
        let fine_domain = ProblemDomain::non_periodic(range2d(0..32, 0..32));
        let ebis = Arc::new(EbIndexSpace::new(fine_domain.clone(), 1.0 / 32.0, &AllRegular, CoarseningPolicy::default(), None));
        let comm = Arc::new(SerialCommunicator);
        let layouts = vec![
            Arc::new(DisjointBoxLayout::single(fine_domain.coarsen_by(2), comm.clone())),
            Arc::new(DisjointBoxLayout::new(fine_domain, vec![range2d(8..24, 8..24)], vec![0], comm)),
        ];
        let levels = EbPoissonOpFactory::hierarchy(layouts, ebis, 1, 2);
        let op = op(levels[1].clone());

        let coarse = EbLevelData::from_function(levels[0].clone(), |[_, y]| y);
        let mut phi = EbLevelData::new(levels[1].clone());
        op.fill_coarse_fine(&mut phi, Some(&coarse));

        assert_relative_eq!(phi.get(0, VolIndex::new((7, 10), 0)), 2.0 / 3.0 * 10.5 / 32.0, epsilon = 1e-14);

        op.fill_coarse_fine(&mut phi, None);
        assert_eq!(phi.get(0, VolIndex::new((7, 10), 0)), 0.0);
    }

    #[test]
    fn multigrid_reduces_the_residual_around_a_hole() {
        let geom = unit_square(32, 8, &hole());
        let factory = laplacian(vec![geom.clone()]);
        let mut rhs = EbLevelData::from_function(geom.clone(), |_| 1.0);
        rhs.scale_by_volume_fraction();

        let mut mg = MultiGrid::new();
        mg.define(&factory, Some(Box::new(DirectSolver::new())), geom.layout().domain(), 1, None);
        mg.homogeneous = false;

        let mut phi = EbLevelData::new(geom);
        let report = mg.solve(&mut phi, &rhs, 1e-6, 20, 0);

        assert!(report.final_residual.is_finite());
        assert!(report.reduction() < 0.1);
    }

    #[test]
    fn norms_agree_across_ranks() {
        let compute = |comm: Arc<dyn Communicator>| {
            let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
            let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / 16.0, &hole(), CoarseningPolicy::default(), None));
            let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, comm));
            let geom = Arc::new(LevelGeometry::new(layout, ebis, 1, None));
            let op = op(geom.clone());
            let data = EbLevelData::from_function(geom, |[x, y]| x - 2.0 * y);
            (op.norm(&data, 0), op.norm(&data, 1), op.norm(&data, 2), op.dot(&data, &data))
        };
        let serial = compute(Arc::new(SerialCommunicator));

        let handles: Vec<_> = ChannelCommunicator::group(3)
            .into_iter()
            .map(|comm| thread::spawn(move || compute(Arc::new(comm))))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), serial);
        }
    }

    #[test]
    #[should_panic(expected = "cannot be coarsened by two")]
    fn create_coarser_past_the_coarsest_layout_panics() {
        let geom = unit_square(4, 1, &AllRegular);
        let op = op(geom.clone());
        op.create_coarser(&EbLevelData::new(geom), false);
    }
}
