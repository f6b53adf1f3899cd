// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

/// 候选框，bbox 为 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别做非极大值抑制，结果按置信度降序排列，最多保留 `max_det` 个
pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_det: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_det {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(class_id: u32, score: f32, bbox: [f32; 4]) -> Candidate {
    Candidate {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_known_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    // 重叠一半：交集 50，并集 150
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 1.0 / 3.0).abs() < 1e-6);
    // 退化框
    assert_eq!(iou(&[1.0, 1.0, 1.0, 1.0], &[1.0, 1.0, 1.0, 1.0]), 0.0);
  }

  #[test]
  fn overlapping_boxes_of_same_class_are_suppressed() {
    let kept = nms(
      vec![
        candidate(0, 0.6, [1.0, 1.0, 11.0, 11.0]),
        candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        candidate(0, 0.5, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.45,
      300,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.5);
  }

  #[test]
  fn different_classes_do_not_suppress_each_other() {
    let kept = nms(
      vec![
        candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        candidate(2, 0.8, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.45,
      300,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn max_det_limits_output() {
    let candidates = (0..10)
      .map(|i| candidate(1, 0.5 + i as f32 * 0.01, [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0]))
      .collect();
    let kept = nms(candidates, 0.45, 3);
    assert_eq!(kept.len(), 3);
    assert!(kept.windows(2).all(|w| w[0].score >= w[1].score));
  }
}
