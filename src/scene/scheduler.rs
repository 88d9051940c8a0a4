use std::ops::Range;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use log::debug;
use threadpool::ThreadPool;

use super::buffer::Framebuffer;
use super::model::Model;
use super::raster::{shade_face, shade_rows};
use super::shader::{Shader, Uniforms};
use crate::error::RenderError;

/// Splits n items into contiguous slices, one per worker.
/// Every slice gets n / workers items and the last one also takes the remainder.
/// With less items than workers, every item gets its own worker.
pub fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    if n == 0 || workers == 0 {
        return Vec::new();
    }
    let workers = workers.min(n);
    let per_worker = n / workers;
    return (0..workers)
        .map(|i| {
            let start = i * per_worker;
            let end = if i == workers - 1 { n } else { start + per_worker };
            start..end
        })
        .collect();
}

/// What a worker has to shade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    Faces(Range<usize>), // Slice of the triangulated face list.
    Rows(Range<usize>),  // Slice of framebuffer rows, for procedural shaders.
}

/// Sent back by a worker once its slice is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub id: usize,
    pub fragments: usize,
}

/// Work of one worker for one frame. Consumed by the worker that runs it.
pub struct Job {
    pub id: usize,
    pub work: Work,
    pub fb: Arc<Framebuffer>,
    pub model: Option<Arc<Model>>,
    pub shader: Shader,
    pub uniforms: Arc<Uniforms>,
    pub done: Sender<JobReport>,
}

impl Job {
    pub fn run(self) {
        let fragments = match (&self.work, &self.model) {
            (Work::Faces(range), Some(model)) => model.faces()[range.clone()]
                .iter()
                .map(|face| shade_face(&self.fb, model, self.shader, &self.uniforms, face))
                .sum(),
            (Work::Faces(_), None) => 0,
            (Work::Rows(rows), _) => {
                shade_rows(&self.fb, self.shader, &self.uniforms, rows.clone());
                0
            }
        };
        // Nobody listening means the frame was abandoned, nothing left to do.
        let _ = self.done.send(JobReport { id: self.id, fragments });
    }
}

/// Waits for exactly `expected` reports. Fails if the senders are gone before that,
/// which is what happens when a worker panics.
pub fn join(done: &Receiver<JobReport>, expected: usize) -> Result<Vec<JobReport>, RenderError> {
    let reports: Vec<JobReport> = done.iter().take(expected).collect();
    if reports.len() < expected {
        return Err(RenderError::WorkerLost {
            lost: expected - reports.len(),
            expected,
        });
    }
    return Ok(reports);
}

/// Fans a shading pass out to a pool of workers and joins them.
pub struct Scheduler {
    pool: ThreadPool,
    workers: usize,
    model: Option<Arc<Model>>,
    // The face list never changes for a model, so its partition is computed once.
    face_slices: Option<Vec<Range<usize>>>,
}

impl Scheduler {
    pub fn new(workers: usize, model: Option<Arc<Model>>) -> Self {
        let workers = workers.max(1);
        return Self {
            pool: ThreadPool::with_name("shader".to_string(), workers),
            workers,
            model,
            face_slices: None,
        };
    }

    pub fn workers(&self) -> usize {
        return self.workers;
    }

    fn face_slices(&mut self, model: &Model) -> Vec<Range<usize>> {
        if self.face_slices.is_none() {
            let slices = partition(model.faces().len(), self.workers);
            debug!(
                "Partitioned {} faces into {} slices: {:?}",
                model.faces().len(),
                slices.len(),
                slices
            );
            self.face_slices = Some(slices);
        }
        return self.face_slices.clone().unwrap_or_default();
    }

    /// Shades one frame into fb, blocking until every worker is done.
    /// Returns the number of fragments written.
    pub fn shade(&mut self, fb: &Arc<Framebuffer>, shader: Shader, uniforms: &Arc<Uniforms>) -> Result<usize, RenderError> {
        let work: Vec<Work> = if shader.is_procedural() {
            partition(fb.height() as usize, self.workers)
                .into_iter()
                .map(Work::Rows)
                .collect()
        } else {
            let model = self.model.clone().ok_or(RenderError::MissingMesh(shader.name()))?;
            self.face_slices(&model).into_iter().map(Work::Faces).collect()
        };

        let expected = work.len();
        let (done_tx, done_rx) = channel();
        for (id, work) in work.into_iter().enumerate() {
            let job = Job {
                id,
                work,
                fb: fb.clone(),
                model: self.model.clone(),
                shader,
                uniforms: uniforms.clone(),
                done: done_tx.clone(),
            };
            self.pool.execute(move || job.run());
        }
        drop(done_tx);

        let reports = join(&done_rx, expected)?;
        return Ok(reports.iter().map(|report| report.fragments).sum());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::color::Color;
    use crate::scene::model::Polygonal;
    use nalgebra::vector;

    #[test]
    fn last_slice_takes_remainder() {
        assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition(9, 3), vec![0..3, 3..6, 6..9]);
        assert_eq!(partition(1, 1), vec![0..1]);
    }

    #[test]
    fn fewer_items_than_workers() {
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert!(partition(0, 8).is_empty());
        assert!(partition(5, 0).is_empty());
    }

    #[test]
    fn slices_cover_everything_once() {
        for n in 0..50 {
            for workers in 1..9 {
                let slices = partition(n, workers);
                let mut next = 0;
                for slice in slices.iter() {
                    assert_eq!(slice.start, next);
                    assert!(slice.end > slice.start);
                    next = slice.end;
                }
                assert_eq!(next, n);
            }
        }
    }

    #[test]
    fn join_reports_lost_workers() {
        let (tx, rx) = channel();
        tx.send(JobReport { id: 0, fragments: 3 }).unwrap();
        drop(tx);
        let err = join(&rx, 2).unwrap_err();
        assert!(matches!(err, RenderError::WorkerLost { lost: 1, expected: 2 }));

        let (tx, rx) = channel();
        for id in 0..3 {
            tx.send(JobReport { id, fragments: id }).unwrap();
        }
        assert_eq!(join(&rx, 3).unwrap().len(), 3);
    }

    fn strip_model(n: usize) -> Model {
        // A row of n small triangles side by side, each facing +z.
        let mut positions = Vec::new();
        let mut polygons = Vec::new();
        for i in 0..n {
            let x = 2.0 * i as f32;
            positions.push(vector![x, 0.0, 0.0, 1.0]);
            positions.push(vector![x + 1.5, 0.0, 0.0, 1.0]);
            positions.push(vector![x, 1.5, 0.0, 1.0]);
            polygons.push(Polygonal { positions: vec![3 * i, 3 * i + 1, 3 * i + 2], normals: None, uvs: None });
        }
        return Model::new(positions, Vec::new(), Vec::new(), &polygons).unwrap();
    }

    fn stack_model(n: usize) -> Model {
        // n copies of one triangle, each nearer and brighter than the one before.
        // The last one faces the light and is the nearest.
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut polygons = Vec::new();
        for i in 0..n {
            let z = 0.05 * i as f32;
            positions.push(vector![0.0, 0.0, z, 1.0]);
            positions.push(vector![3.0, 0.0, z, 1.0]);
            positions.push(vector![0.0, 3.0, z, 1.0]);
            let c = 1.0 - 0.1 * (n - 1 - i) as f32;
            normals.push(vector![0.0, (1.0 - c * c).sqrt(), c]);
            polygons.push(Polygonal {
                positions: vec![3 * i, 3 * i + 1, 3 * i + 2],
                normals: Some(vec![i, i, i]),
                uvs: None,
            });
        }
        return Model::new(positions, normals, Vec::new(), &polygons).unwrap();
    }

    fn strip_uniforms() -> Uniforms {
        // Object units to pixels: 4 pixels per unit, y flipped, depth 0.5.
        return Uniforms {
            width: 64,
            height: 16,
            vpv_matrix: nalgebra::Matrix4::new_nonuniform_scaling(&vector![4.0, -4.0, 1.0])
                .append_translation(&vector![0.0, 12.0, 0.5]),
            ..Default::default()
        };
    }

    #[test_log::test]
    fn parallel_shading_matches_single_worker() {
        let model = Arc::new(strip_model(7));
        let uniforms = Arc::new(strip_uniforms());

        let single = Arc::new(Framebuffer::new(64, 16).unwrap());
        let written_single = Scheduler::new(1, Some(model.clone()))
            .shade(&single, Shader::Gouraud, &uniforms)
            .unwrap();

        let parallel = Arc::new(Framebuffer::new(64, 16).unwrap());
        let mut scheduler = Scheduler::new(3, Some(model.clone()));
        let written_parallel = scheduler.shade(&parallel, Shader::Gouraud, &uniforms).unwrap();

        assert!(written_single > 0);
        assert_eq!(written_single, written_parallel);
        assert_eq!(single.layers().color, parallel.layers().color);
        assert_eq!(scheduler.face_slices, Some(vec![0..2, 2..4, 4..7]));
    }

    #[test_log::test]
    fn overlapping_faces_keep_the_nearest_across_workers() {
        let model = Arc::new(stack_model(8));
        let uniforms = Arc::new(strip_uniforms());
        let reference = Arc::new(Framebuffer::new(64, 16).unwrap());
        Scheduler::new(1, Some(model.clone()))
            .shade(&reference, Shader::Gouraud, &uniforms)
            .unwrap();

        let near_depth = 0.5 + 0.05 * 7.0;
        {
            let layers = reference.layers();
            let covered: Vec<usize> = (0..layers.z_buffer.len())
                .filter(|&i| layers.z_buffer[i] > f32::NEG_INFINITY)
                .collect();
            assert!(covered.len() > 50);
            for &i in covered.iter() {
                assert!((layers.z_buffer[i] - near_depth).abs() < 1e-5);
                assert_eq!(layers.color[i], Color::WHITE);
            }
        }

        // The nearest face always lands in the last slice, racing the farther ones.
        for workers in 2..=4 {
            let mut scheduler = Scheduler::new(workers, Some(model.clone()));
            for _ in 0..25 {
                let fb = Arc::new(Framebuffer::new(64, 16).unwrap());
                scheduler.shade(&fb, Shader::Gouraud, &uniforms).unwrap();
                let layers = fb.layers();
                let expected = reference.layers();
                assert_eq!(layers.z_buffer, expected.z_buffer);
                assert_eq!(layers.color, expected.color);
                assert_eq!(layers.depth, expected.depth);
            }
            let last = scheduler.face_slices.clone().and_then(|slices| slices.last().cloned());
            assert_eq!(last.map(|slice| slice.contains(&7)), Some(true));
        }
    }

    #[test]
    fn partition_is_reused_between_frames() {
        let model = Arc::new(strip_model(4));
        let uniforms = Arc::new(strip_uniforms());
        let mut scheduler = Scheduler::new(2, Some(model));
        let fb = Arc::new(Framebuffer::new(64, 16).unwrap());
        let first = scheduler.shade(&fb, Shader::Identity, &uniforms).unwrap();
        let slices = scheduler.face_slices.clone();
        fb.clear();
        let second = scheduler.shade(&fb, Shader::Identity, &uniforms).unwrap();
        assert_eq!(first, second);
        assert_eq!(scheduler.face_slices, slices);
    }

    #[test]
    fn mesh_shader_without_mesh_fails() {
        let mut scheduler = Scheduler::new(2, None);
        let fb = Arc::new(Framebuffer::new(8, 8).unwrap());
        let uniforms = Arc::new(Uniforms::default());
        let err = scheduler.shade(&fb, Shader::Gouraud, &uniforms).unwrap_err();
        assert!(matches!(err, RenderError::MissingMesh("gouraud")));
    }

    #[test]
    fn procedural_shading_covers_all_rows() {
        let mut scheduler = Scheduler::new(4, None);
        let fb = Arc::new(Framebuffer::new(16, 10).unwrap());
        let uniforms = Arc::new(Uniforms { width: 16, height: 10, ..Default::default() });
        scheduler.shade(&fb, Shader::Rings, &uniforms).unwrap();
        assert!(fb.layers().color.iter().all(|&c| c != Color::TRANSPARENT));
    }
}
