// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/progress.rs - 进度报告
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
    atomic::{AtomicBool, AtomicU8, Ordering},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

pub trait Progress: Send + Sync {
  /// 设置百分比 (0 - 100)
  fn set(&self, percent: u8);

  fn message(&self, _message: &str) {}
}

pub struct NoProgress;

impl Progress for NoProgress {
  fn set(&self, _percent: u8) {}
}

/// 输出到日志
pub struct LogProgress;

impl Progress for LogProgress {
  fn set(&self, percent: u8) {
    debug!("进度: {}%", percent);
  }

  fn message(&self, message: &str) {
    debug!("阶段: {}", message);
  }
}

/// 终端进度条
pub struct ProgressBarSink {
  bar: ProgressBar,
}

impl ProgressBarSink {
  pub fn new() -> Self {
    let bar = ProgressBar::new(100);
    bar.set_draw_target(ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
      .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    Self { bar }
  }

  pub fn finish(&self) {
    self.bar.finish_and_clear();
  }

  pub fn is_finished(&self) -> bool {
    self.bar.is_finished()
  }

  /// 执行 `task`，不论结果如何随后收起进度条
  pub fn run<T>(&self, task: impl FnOnce() -> T) -> T {
    let result = task();
    self.finish();
    result
  }
}

impl Default for ProgressBarSink {
  fn default() -> Self {
    Self::new()
  }
}

impl Progress for ProgressBarSink {
  fn set(&self, percent: u8) {
    self.bar.set_position(percent.min(100) as u64);
  }

  fn message(&self, message: &str) {
    self.bar.set_message(message.to_string());
  }
}

/// 模拟进度参数
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSettings {
  pub step: u8,
  pub interval: Duration,
  pub cap: u8,
}

impl Default for SimulatedSettings {
  fn default() -> Self {
    Self {
      step: 10,
      interval: Duration::from_millis(200),
      cap: 90,
    }
  }
}

/// 模拟进度
///
/// 与实际推理进度无关，只按时间递增，且不会超过 `cap`。
/// 仅在检测器无法报告真实进度时使用。
pub struct SimulatedProgress {
  stop: Arc<AtomicBool>,
  current: Arc<AtomicU8>,
  handle: Option<JoinHandle<()>>,
}

impl SimulatedProgress {
  pub fn start(sink: Arc<dyn Progress>, settings: SimulatedSettings) -> Self {
    let stop = Arc::new(AtomicBool::new(false));
    let current = Arc::new(AtomicU8::new(0));

    let handle = {
      let stop = stop.clone();
      let current = current.clone();
      thread::spawn(move || {
        sink.message("模拟进度");
        while !stop.load(Ordering::Acquire) {
          thread::sleep(settings.interval);
          if stop.load(Ordering::Acquire) {
            break;
          }
          let next = current
            .load(Ordering::Acquire)
            .saturating_add(settings.step)
            .min(settings.cap);
          current.store(next, Ordering::Release);
          sink.set(next);
        }
      })
    };

    Self {
      stop,
      current,
      handle: Some(handle),
    }
  }

  pub fn current(&self) -> u8 {
    self.current.load(Ordering::Acquire)
  }

  /// 停止计时线程并等待其退出
  pub fn stop(mut self) -> u8 {
    self.halt();
    self.current()
  }

  fn halt(&mut self) {
    self.stop.store(true, Ordering::Release);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for SimulatedProgress {
  fn drop(&mut self) {
    self.halt();
  }
}
