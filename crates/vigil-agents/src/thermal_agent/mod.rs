// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The agent responsible for keeping CPU and GPU temperatures in check.
//!
//! It is the only agent allowed to raise fans above the firmware curve, and
//! the first to cut power limits when the machine runs hot. A thermal
//! emergency is a hard safety condition: learned preferences are ignored.

mod agent;

pub use agent::*;
