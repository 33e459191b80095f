// 该文件是 Jungu （菌菇） 项目的一部分。
// src/task.rs - 任务
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

use std::{
  sync::{
    Arc,
    mpsc::{self, RecvTimeoutError, TrySendError},
  },
  thread,
  time::Duration,
};

use anyhow::{Context, anyhow};
use tracing::{error, info, warn};

use crate::{
  frame::SourceFrame,
  input::{FrameHandler, FrameSource},
  label::LabelTable,
  model::ModelProvider,
  output::Render,
  pipeline::{Classifier, ClassifierPipeline, PipelineConfig, PipelineError, PipelineStats},
};

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FORCED_EXIT_DELAY: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  type Output;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 取一帧，在当前线程上同步加载模型并分类
#[derive(Debug, Clone, Default)]
pub struct OneShotTask {
  config: PipelineConfig,
  labels: LabelTable,
}

impl OneShotTask {
  pub fn new(config: PipelineConfig, labels: LabelTable) -> Self {
    Self { config, labels }
  }
}

impl<I: FrameSource, M: ModelProvider, O: Render> Task<I, M, O> for OneShotTask {
  type Error = anyhow::Error;
  type Output = crate::pipeline::Prediction;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::sync_channel(1);
    let handler: FrameHandler = Arc::new(move |frame: SourceFrame| {
      // 只保留第一帧，其余帧直接释放
      if let Err(TrySendError::Full(frame) | TrySendError::Disconnected(frame)) = tx.try_send(frame) {
        frame.release();
      }
    });
    input.start(handler)?;
    let frame = rx.recv_timeout(FIRST_FRAME_TIMEOUT);
    input.stop();
    let frame = frame.map_err(|_| anyhow!("{:?} 内没有输入帧", FIRST_FRAME_TIMEOUT))?;
    info!("输入帧获取成功: {:?}", frame);

    let bytes = model.model_bytes()?;
    let mut engine = model
      .load(&bytes, self.config.input_size)
      .context("模型加载失败")?;
    let classifier = Classifier::new(self.config.preprocessor(), self.labels);
    classifier.check_engine(engine.as_ref())?;

    info!("开始推理...");
    let result = classifier.classify(&mut engine, frame.raw(), frame.sequence());
    frame.release();
    let prediction = match result {
      Ok(prediction) => prediction,
      Err(e) => {
        let _ = output.render_error(&e);
        return Err(e.into());
      }
    };
    info!("推理完成，耗时: {:.2?}", prediction.latency);
    output.render_result(&prediction)?;

    Ok(prediction)
  }
}

/// 持续运行流水线，直到收到中断信号或处理了指定帧数
#[derive(Debug, Clone)]
pub struct ContinuousTask {
  config: PipelineConfig,
  labels: LabelTable,
  frame_number: Option<u64>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn new(config: PipelineConfig, labels: LabelTable) -> Self {
    Self {
      config,
      labels,
      frame_number: None,
      handle_interrupt: true,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 是否安装 Ctrl-C 处理函数，进程内只能安装一次
  pub fn with_interrupt_handler(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<I, M, O> Task<I, M, O> for ContinuousTask
where
  I: FrameSource,
  M: ModelProvider,
  O: Render + 'static,
{
  type Error = anyhow::Error;
  type Output = PipelineStats;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();
    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(FORCED_EXIT_DELAY);
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })
      .context("无法设置 Ctrl-C 处理函数")?;
    }

    let pipeline = Arc::new(ClassifierPipeline::start(
      self.config,
      self.labels,
      Arc::new(output),
    )?);

    let on_frame = pipeline.clone();
    input.start(Arc::new(move |frame: SourceFrame| {
      on_frame.on_frame(frame);
    }))?;

    // 模型在工作线程上加载，期间到达的帧全部丢弃
    let bytes = model.model_bytes()?;
    let mut loading = Some(pipeline.load_model_in_background(model, bytes)?);

    let mut failure = None;
    loop {
      if let Some(result) = loading.as_ref().and_then(|handle| handle.try_result()) {
        loading = None;
        match result {
          Ok(()) => info!("模型就绪，开始分类"),
          Err(e) => {
            error!("模型加载失败，退出任务: {}", e);
            failure = Some(e);
            break;
          }
        }
      }

      let stats = pipeline.stats();
      if let Some(n) = self.frame_number
        && stats.completed + stats.failed >= n
      {
        info!("达到指定帧数 {}, 退出任务循环", n);
        break;
      }

      match rx.recv_timeout(POLL_INTERVAL) {
        Ok(()) => {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
      }
    }

    input.stop();
    match pipeline.stop() {
      Ok(()) => {}
      Err(PipelineError::ShutdownTimeout(timeout)) => {
        warn!("推理未在 {:?} 内结束，放弃等待", timeout)
      }
      Err(e) => return Err(e.into()),
    }

    let stats = pipeline.stats();
    info!("任务完成: {}", stats);
    match failure {
      Some(e) => Err(e.into()),
      None => Ok(stats),
    }
  }
}
