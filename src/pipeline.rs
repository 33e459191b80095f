// 该文件是 Jungu （菌菇） 项目的一部分。
// src/pipeline.rs - 分类流水线
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # 分类流水线
//!
//! 帧源线程只做“接收或丢弃”的判断，所有重活都在一个专用工作线程上完成：
//!
//! ```text
//! 帧源 ──on_frame──▶ [Ready→Busy CAS] ──channel──▶ 工作线程
//!                                                   ├─ 预处理
//!                                                   ├─ 推理
//!                                                   ├─ argmax → 标签
//!                                                   └─ 输出 → 状态回到 Ready
//! ```
//!
//! 状态只有 `Idle`（无模型）、`Ready`、`Busy` 三种，保存在一个原子变量中。
//! `Busy` 时到达的帧立即释放（丢帧而非排队），`Idle` 时同样丢弃。

use std::{
  any::Any,
  fmt,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{RawFrame, SourceFrame},
  label::{LabelIndexOutOfRange, LabelTable},
  model::{EngineError, InferenceEngine, ModelLoader},
  output::{OutputError, Render},
  preprocess::{DEFAULT_INPUT_SIZE, PreprocessError, Preprocessor, Rotation},
};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
  /// 模型尚未就绪
  Idle = 0,
  /// 模型就绪，没有正在进行的推理
  Ready = 1,
  /// 有一帧正在推理
  Busy = 2,
}

impl PipelineState {
  fn from_u8(value: u8) -> Self {
    match value {
      1 => PipelineState::Ready,
      2 => PipelineState::Busy,
      _ => PipelineState::Idle,
    }
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Idle => "Idle",
      PipelineState::Ready => "Ready",
      PipelineState::Busy => "Busy",
    };
    f.write_str(name)
  }
}

/// `on_frame` 对一帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
  /// 已交给工作线程
  Accepted,
  /// 模型未就绪，已丢弃
  DroppedNotReady,
  /// 上一帧仍在推理，已丢弃
  DroppedBusy,
  /// 流水线已停止，已丢弃
  DroppedStopped,
}

/// 单帧处理错误
#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] EngineError),
  #[error("模型与标签表不匹配: {0}")]
  LabelIndexOutOfRange(#[from] LabelIndexOutOfRange),
}

impl ClassifyError {
  /// 配置缺陷需要重新加载模型才能恢复，其余错误只影响当前帧
  pub fn is_configuration_defect(&self) -> bool {
    matches!(self, ClassifyError::LabelIndexOutOfRange(_))
  }
}

/// 流水线控制错误
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("模型加载错误: {0}")]
  ModelLoad(#[from] EngineError),
  #[error("标签数量 {labels} 与模型输出宽度 {outputs} 不一致")]
  LabelMismatch { labels: usize, outputs: usize },
  #[error("工作线程已停止")]
  WorkerStopped,
  #[error("无法创建工作线程: {0}")]
  Spawn(std::io::Error),
  #[error("等待推理完成超时 ({0:?})")]
  ShutdownTimeout(Duration),
}

/// 一次成功分类的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub sequence: u64,
  pub index: usize,
  pub label: String,
  pub score: f32,
  pub scores: Vec<f32>,
  pub latency: Duration,
}

/// 返回最大值的索引；相等时取最靠前的索引
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (index, &score) in scores.iter().enumerate() {
    match best {
      Some((_, best_score)) if score > best_score => best = Some((index, score)),
      None => best = Some((index, score)),
      _ => {}
    }
  }
  best.map(|(index, _)| index)
}

/// 预处理、推理、决策的组合，不含任何线程与状态
#[derive(Debug, Clone)]
pub struct Classifier {
  preprocessor: Preprocessor,
  labels: LabelTable,
}

impl Classifier {
  pub fn new(preprocessor: Preprocessor, labels: LabelTable) -> Self {
    Self {
      preprocessor,
      labels,
    }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn preprocessor(&self) -> &Preprocessor {
    &self.preprocessor
  }

  /// 检查模型输出宽度与标签数量是否一致
  pub fn check_engine<E: InferenceEngine + ?Sized>(&self, engine: &E) -> Result<(), PipelineError> {
    let outputs = engine.output_width();
    if outputs != self.labels.len() {
      return Err(PipelineError::LabelMismatch {
        labels: self.labels.len(),
        outputs,
      });
    }
    Ok(())
  }

  pub fn classify<E: InferenceEngine + ?Sized>(
    &self,
    engine: &mut E,
    frame: &RawFrame,
    sequence: u64,
  ) -> Result<Prediction, ClassifyError> {
    let started = Instant::now();
    let tensor = self.preprocessor.normalize(frame)?;
    let scores = engine.infer(&tensor)?;
    drop(tensor);
    self.decide(scores, sequence, started.elapsed())
  }

  /// 由得分向量得到预测结果
  pub fn decide(
    &self,
    scores: Vec<f32>,
    sequence: u64,
    latency: Duration,
  ) -> Result<Prediction, ClassifyError> {
    let index = argmax(&scores)
      .ok_or_else(|| ClassifyError::Inference(EngineError::Inference("输出为空".to_string())))?;
    let label = self.labels.resolve(index)?.to_string();
    if scores.len() != self.labels.len() {
      return Err(ClassifyError::Inference(EngineError::Inference(format!(
        "输出宽度 {} 与标签数量 {} 不一致",
        scores.len(),
        self.labels.len()
      ))));
    }
    Ok(Prediction {
      sequence,
      index,
      label,
      score: scores[index],
      scores,
      latency,
    })
  }
}

/// 流水线配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
  pub input_size: usize,
  pub rotation: Rotation,
  pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      rotation: Rotation::default(),
      shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
    }
  }
}

impl PipelineConfig {
  pub fn with_input_size(mut self, input_size: usize) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_rotation(mut self, rotation: Rotation) -> Self {
    self.rotation = rotation;
    self
  }

  pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
    self.shutdown_timeout = timeout;
    self
  }

  pub fn preprocessor(&self) -> Preprocessor {
    Preprocessor::new(self.input_size, self.rotation)
  }
}

/// 流水线计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
  pub accepted: u64,
  pub dropped_not_ready: u64,
  pub dropped_busy: u64,
  pub dropped_stopped: u64,
  pub completed: u64,
  pub failed: u64,
}

impl PipelineStats {
  pub fn dropped(&self) -> u64 {
    self.dropped_not_ready + self.dropped_busy + self.dropped_stopped
  }
}

impl fmt::Display for PipelineStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "接收 {} / 完成 {} / 失败 {} / 丢弃 {} (未就绪 {}, 忙 {}, 已停止 {})",
      self.accepted,
      self.completed,
      self.failed,
      self.dropped(),
      self.dropped_not_ready,
      self.dropped_busy,
      self.dropped_stopped
    )
  }
}

#[derive(Default)]
struct Counters {
  accepted: AtomicU64,
  dropped_not_ready: AtomicU64,
  dropped_busy: AtomicU64,
  dropped_stopped: AtomicU64,
  completed: AtomicU64,
  failed: AtomicU64,
}

impl Counters {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn snapshot(&self) -> PipelineStats {
    PipelineStats {
      accepted: self.accepted.load(Ordering::Relaxed),
      dropped_not_ready: self.dropped_not_ready.load(Ordering::Relaxed),
      dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
      dropped_stopped: self.dropped_stopped.load(Ordering::Relaxed),
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}

struct Shared {
  state: AtomicU8,
  accepting: AtomicBool,
  counters: Counters,
}

impl Shared {
  fn state(&self) -> PipelineState {
    PipelineState::from_u8(self.state.load(Ordering::Acquire))
  }

  fn set_state(&self, state: PipelineState) {
    self.state.store(state as u8, Ordering::Release);
  }
}

enum Command {
  Classify(SourceFrame),
  Load {
    loader: Box<dyn ModelLoader>,
    bytes: Vec<u8>,
    reply: Sender<Result<(), PipelineError>>,
  },
  Shutdown,
}

/// 后台模型加载的结果句柄
pub struct LoadHandle {
  reply: Receiver<Result<(), PipelineError>>,
}

impl LoadHandle {
  /// 阻塞等待加载完成
  pub fn wait(self) -> Result<(), PipelineError> {
    self.reply.recv().unwrap_or(Err(PipelineError::WorkerStopped))
  }

  /// 非阻塞查询，尚未完成时返回 `None`
  pub fn try_result(&self) -> Option<Result<(), PipelineError>> {
    match self.reply.try_recv() {
      Ok(result) => Some(result),
      Err(mpsc::TryRecvError::Empty) => None,
      Err(mpsc::TryRecvError::Disconnected) => Some(Err(PipelineError::WorkerStopped)),
    }
  }
}

/// 单飞分类流水线。
///
/// 任意线程都可以调用 [`ClassifierPipeline::on_frame`]；推理只在内部工作线程中进行，
/// 推理引擎也由该线程独占。
pub struct ClassifierPipeline {
  shared: Arc<Shared>,
  commands: Sender<Command>,
  worker: Mutex<Option<JoinHandle<()>>>,
  finished: Mutex<Option<Receiver<()>>>,
  shutdown_timeout: Duration,
}

impl ClassifierPipeline {
  pub fn start(
    config: PipelineConfig,
    labels: LabelTable,
    output: Arc<dyn Render>,
  ) -> Result<Self, PipelineError> {
    let shared = Arc::new(Shared {
      state: AtomicU8::new(PipelineState::Idle as u8),
      accepting: AtomicBool::new(true),
      counters: Counters::default(),
    });
    let (commands, receiver) = mpsc::channel();
    let (finished_tx, finished_rx) = mpsc::channel();

    let classifier = Classifier::new(config.preprocessor(), labels);
    let input_size = config.input_size;
    let worker_shared = shared.clone();
    let handle = thread::Builder::new()
      .name("jungu-worker".to_string())
      .spawn(move || {
        // 引擎在工作线程内创建和销毁，不需要跨线程移动
        let worker = Worker {
          classifier,
          input_size,
          engine: None,
          output,
          shared: worker_shared,
        };
        worker.run(receiver);
        let _ = finished_tx.send(());
      })
      .map_err(PipelineError::Spawn)?;

    info!(
      "分类流水线已启动: 输入 {}x{}, 旋转 {}°",
      config.input_size, config.input_size, config.rotation
    );

    Ok(Self {
      shared,
      commands,
      worker: Mutex::new(Some(handle)),
      finished: Mutex::new(Some(finished_rx)),
      shutdown_timeout: config.shutdown_timeout,
    })
  }

  pub fn state(&self) -> PipelineState {
    self.shared.state()
  }

  pub fn is_ready(&self) -> bool {
    self.state() != PipelineState::Idle
  }

  pub fn stats(&self) -> PipelineStats {
    self.shared.counters.snapshot()
  }

  /// 帧源回调入口。丢弃的帧在返回前释放，接收的帧在处理结束时释放。
  pub fn on_frame(&self, frame: SourceFrame) -> FrameDisposition {
    let counters = &self.shared.counters;
    if !self.shared.accepting.load(Ordering::Acquire) {
      Counters::bump(&counters.dropped_stopped);
      frame.release();
      return FrameDisposition::DroppedStopped;
    }

    let accepted = self.shared.state.compare_exchange(
      PipelineState::Ready as u8,
      PipelineState::Busy as u8,
      Ordering::AcqRel,
      Ordering::Acquire,
    );
    match accepted {
      Ok(_) => {
        let sequence = frame.sequence();
        if self.commands.send(Command::Classify(frame)).is_err() {
          // 工作线程已退出，帧随发送失败的命令一起释放
          self.shared.set_state(PipelineState::Idle);
          Counters::bump(&counters.dropped_stopped);
          return FrameDisposition::DroppedStopped;
        }
        Counters::bump(&counters.accepted);
        debug!("接收第 {} 帧", sequence);
        FrameDisposition::Accepted
      }
      Err(state) if state == PipelineState::Busy as u8 => {
        Counters::bump(&counters.dropped_busy);
        frame.release();
        FrameDisposition::DroppedBusy
      }
      Err(_) => {
        Counters::bump(&counters.dropped_not_ready);
        frame.release();
        FrameDisposition::DroppedNotReady
      }
    }
  }

  /// 在工作线程上加载模型并等待结果
  pub fn load_model<L: ModelLoader>(&self, loader: L, bytes: Vec<u8>) -> Result<(), PipelineError> {
    self.load_model_in_background(loader, bytes)?.wait()
  }

  /// 提交模型加载后立即返回；加载期间到达的帧被丢弃
  pub fn load_model_in_background<L: ModelLoader>(
    &self,
    loader: L,
    bytes: Vec<u8>,
  ) -> Result<LoadHandle, PipelineError> {
    let (reply, receiver) = mpsc::channel();
    self
      .commands
      .send(Command::Load {
        loader: Box::new(loader),
        bytes,
        reply,
      })
      .map_err(|_| PipelineError::WorkerStopped)?;
    Ok(LoadHandle { reply: receiver })
  }

  /// 停止接收新帧，在超时时间内等待正在进行的推理结束，然后释放推理引擎。
  ///
  /// 超时后工作线程仍在运行，再次调用会继续等待，直到它真正退出才返回 `Ok`。
  pub fn stop(&self) -> Result<(), PipelineError> {
    let was_accepting = self.shared.accepting.swap(false, Ordering::AcqRel);
    let mut finished_slot = lock(&self.finished);
    let Some(finished) = finished_slot.take() else {
      return Ok(());
    };
    if was_accepting {
      info!("正在停止分类流水线...");
      let _ = self.commands.send(Command::Shutdown);
    }

    match finished.recv_timeout(self.shutdown_timeout) {
      Ok(()) | Err(RecvTimeoutError::Disconnected) => {
        if let Some(handle) = lock(&self.worker).take() {
          if handle.join().is_err() {
            error!("工作线程异常退出");
          }
        }
        info!("分类流水线已停止: {}", self.stats());
        Ok(())
      }
      Err(RecvTimeoutError::Timeout) => {
        warn!(
          "等待推理完成超时 ({:?})，工作线程将在推理结束后自行退出",
          self.shutdown_timeout
        );
        *finished_slot = Some(finished);
        Err(PipelineError::ShutdownTimeout(self.shutdown_timeout))
      }
    }
  }
}

impl Drop for ClassifierPipeline {
  fn drop(&mut self) {
    let _ = self.stop();
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Worker {
  classifier: Classifier,
  input_size: usize,
  engine: Option<Box<dyn InferenceEngine>>,
  output: Arc<dyn Render>,
  shared: Arc<Shared>,
}

impl Worker {
  fn run(mut self, commands: Receiver<Command>) {
    debug!("工作线程启动");
    for command in commands.iter() {
      match command {
        Command::Classify(frame) => self.process(frame),
        Command::Load {
          loader,
          bytes,
          reply,
        } => {
          let result = self.load(loader.as_ref(), &bytes);
          let _ = reply.send(result);
        }
        Command::Shutdown => break,
      }
    }
    if self.engine.take().is_some() {
      info!("释放推理引擎");
    }
    self.shared.set_state(PipelineState::Idle);
    debug!("工作线程退出");
  }

  fn load(&mut self, loader: &dyn ModelLoader, bytes: &[u8]) -> Result<(), PipelineError> {
    let started = Instant::now();
    let engine = loader.load(bytes, self.input_size).map_err(|e| {
      error!("模型加载失败: {}", e);
      PipelineError::ModelLoad(e)
    })?;
    if let Err(e) = self.classifier.check_engine(engine.as_ref()) {
      error!("模型配置错误: {}", e);
      return Err(e);
    }

    let replaced = self.engine.replace(engine).is_some();
    let _ = self.shared.state.compare_exchange(
      PipelineState::Idle as u8,
      PipelineState::Ready as u8,
      Ordering::AcqRel,
      Ordering::Acquire,
    );
    info!(
      "模型{}完成，耗时 {:.2?}",
      if replaced { "重新加载" } else { "加载" },
      started.elapsed()
    );
    Ok(())
  }

  fn process(&mut self, frame: SourceFrame) {
    let counters = &self.shared.counters;
    let sequence = frame.sequence();
    let result = match self.engine.as_mut() {
      Some(engine) => {
        let classifier = &self.classifier;
        panic::catch_unwind(AssertUnwindSafe(|| {
          classifier.classify(engine, frame.raw(), sequence)
        }))
        .unwrap_or_else(|payload| {
          Err(ClassifyError::Inference(EngineError::Inference(format!(
            "推理过程崩溃: {}",
            panic_message(payload.as_ref())
          ))))
        })
      }
      None => Err(ClassifyError::Inference(EngineError::NotLoaded)),
    };
    frame.release();

    match result {
      Ok(prediction) => {
        Counters::bump(&counters.completed);
        debug!(
          "第 {} 帧预测: {} ({}), 得分 {:.4}, 耗时 {:.2?}",
          sequence, prediction.label, prediction.index, prediction.score, prediction.latency
        );
        self.dispatch(|output| output.render_result(&prediction));
        self.shared.set_state(PipelineState::Ready);
      }
      Err(e) if e.is_configuration_defect() => {
        Counters::bump(&counters.failed);
        error!("第 {} 帧: {}，卸载模型，等待重新加载", sequence, e);
        self.engine = None;
        self.dispatch(|output| output.render_error(&e));
        self.shared.set_state(PipelineState::Idle);
      }
      Err(e) => {
        Counters::bump(&counters.failed);
        warn!("第 {} 帧处理失败: {}", sequence, e);
        self.dispatch(|output| output.render_error(&e));
        let next = if self.engine.is_some() {
          PipelineState::Ready
        } else {
          PipelineState::Idle
        };
        self.shared.set_state(next);
      }
    }
  }

  /// 调用输出端；输出端的错误或崩溃只记录日志，不影响流水线状态
  fn dispatch<F>(&self, render: F)
  where
    F: FnOnce(&dyn Render) -> Result<(), OutputError>,
  {
    let output = self.output.as_ref();
    match panic::catch_unwind(AssertUnwindSafe(|| render(output))) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!("输出失败: {}", e),
      Err(payload) => error!("输出端崩溃: {}", panic_message(payload.as_ref())),
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message
  } else {
    "未知原因"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::NormalizedTensor, model::ScoreVector};

  struct Fixed(Vec<f32>);

  impl InferenceEngine for Fixed {
    fn output_width(&self) -> usize {
      self.0.len()
    }

    fn infer(&mut self, _input: &NormalizedTensor) -> Result<ScoreVector, EngineError> {
      Ok(self.0.clone())
    }
  }

  fn classifier(labels: &[&str]) -> Classifier {
    Classifier::new(
      Preprocessor::new(8, Rotation::Clockwise90),
      LabelTable::new(labels.iter().copied()).unwrap(),
    )
  }

  #[test]
  fn argmax_prefers_first_maximum() {
    assert_eq!(argmax(&[0.5, 0.9, 0.9, 0.1]), Some(1));
    assert_eq!(argmax(&[3.0, 3.0, 3.0]), Some(0));
    assert_eq!(argmax(&[-2.0, -1.0]), Some(1));
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn decide_maps_index_through_labels() {
    let classifier = classifier(&["a", "b", "c", "d"]);
    let prediction = classifier
      .decide(vec![0.5, 0.9, 0.9, 0.1], 7, Duration::ZERO)
      .unwrap();
    assert_eq!(prediction.index, 1);
    assert_eq!(prediction.label, "b");
    assert_eq!(prediction.score, 0.9);
    assert_eq!(prediction.sequence, 7);
  }

  #[test]
  fn decide_rejects_wrong_width() {
    let classifier = classifier(&["a", "b"]);
    let err = classifier
      .decide(vec![0.3, 0.2, 0.1], 0, Duration::ZERO)
      .unwrap_err();
    assert!(matches!(err, ClassifyError::Inference(_)));
    assert!(!err.is_configuration_defect());

    let err = classifier
      .decide(vec![0.1, 0.2, 0.3], 0, Duration::ZERO)
      .unwrap_err();
    assert!(matches!(
      err,
      ClassifyError::LabelIndexOutOfRange(LabelIndexOutOfRange { index: 2, len: 2 })
    ));
    assert!(err.is_configuration_defect());
  }

  #[test]
  fn check_engine_detects_label_mismatch() {
    let classifier = classifier(&["a", "b", "c"]);
    assert!(classifier.check_engine(&Fixed(vec![0.0; 3])).is_ok());
    assert!(matches!(
      classifier.check_engine(&Fixed(vec![0.0; 4])),
      Err(PipelineError::LabelMismatch {
        labels: 3,
        outputs: 4
      })
    ));
  }

  #[test]
  fn classify_runs_the_whole_chain() {
    let classifier = classifier(&["a", "b", "c"]);
    let mut engine = Fixed(vec![0.2, 0.1, 0.7]);
    let frame = RawFrame::solid_rgba(32, 24, [1, 2, 3]);
    let prediction = classifier.classify(&mut engine, &frame, 3).unwrap();
    assert_eq!(prediction.label, "c");
    assert_eq!(prediction.scores, vec![0.2, 0.1, 0.7]);
  }

  #[test]
  fn label_index_out_of_range_is_a_configuration_defect() {
    let err = ClassifyError::from(LabelIndexOutOfRange { index: 14, len: 14 });
    assert!(err.is_configuration_defect());
  }

  #[test]
  fn config_builder() {
    let config = PipelineConfig::default()
      .with_input_size(96)
      .with_rotation(Rotation::None)
      .with_shutdown_timeout(Duration::from_millis(10));
    assert_eq!(config.preprocessor(), Preprocessor::new(96, Rotation::None));
    assert_eq!(config.shutdown_timeout, Duration::from_millis(10));
    assert_eq!(PipelineConfig::default().input_size, 224);
  }
}
