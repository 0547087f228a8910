use std::collections::{HashMap, HashSet};

use weave_types::{ExecutionSchedule, ExecutionTask, ScheduledTaskGroup};

/// Kahn-style wave scheduling. Duplicate ids are renamed deterministically,
/// dangling and self dependencies dropped, and any cycle is reported through
/// `has_cycle` plus the residual task list instead of an error.
pub fn build_schedule(tasks: &[ExecutionTask]) -> ExecutionSchedule {
    let tasks = dedupe_task_ids(tasks);
    let known: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();

    // dependency normalization: known ids only, no self-edges, first
    // occurrence wins
    let mut deps_by_id: HashMap<String, Vec<String>> = HashMap::new();
    for task in &tasks {
        let mut seen = HashSet::new();
        let deps = task
            .depends_on
            .iter()
            .filter(|dep| known.contains(*dep) && *dep != &task.id)
            .filter(|dep| seen.insert((*dep).clone()))
            .cloned()
            .collect();
        deps_by_id.insert(task.id.clone(), deps);
    }

    let mut in_degree: HashMap<String, usize> = tasks
        .iter()
        .map(|t| (t.id.clone(), deps_by_id[&t.id].len()))
        .collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for task in &tasks {
        for dep in &deps_by_id[&task.id] {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(task.id.clone());
        }
    }

    let index_of: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.id.clone(), idx))
        .collect();

    let mut emitted: HashSet<String> = HashSet::new();
    let mut groups: Vec<ScheduledTaskGroup> = Vec::new();
    let mut ordered_task_ids: Vec<String> = Vec::new();
    let mut wave = 0usize;

    loop {
        let mut ready: Vec<&ExecutionTask> = tasks
            .iter()
            .filter(|t| !emitted.contains(&t.id) && in_degree[&t.id] == 0)
            .collect();
        if ready.is_empty() {
            break;
        }

        // priority desc, insertion order asc
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| index_of[&a.id].cmp(&index_of[&b.id]))
        });

        let mut current: Option<ScheduledTaskGroup> = None;
        for task in &ready {
            emitted.insert(task.id.clone());
            ordered_task_ids.push(task.id.clone());
            match current.as_mut() {
                Some(group) if group.mode == task.mode => group.task_ids.push(task.id.clone()),
                _ => {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some(ScheduledTaskGroup {
                        wave,
                        mode: task.mode,
                        task_ids: vec![task.id.clone()],
                    });
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        for task in ready {
            for dependent in dependents.get(&task.id).cloned().unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
        wave += 1;
    }

    let residual_task_ids: Vec<String> = tasks
        .iter()
        .filter(|t| !emitted.contains(&t.id))
        .map(|t| t.id.clone())
        .collect();

    ExecutionSchedule {
        groups,
        ordered_task_ids,
        has_cycle: !residual_task_ids.is_empty(),
        residual_task_ids,
    }
}

fn dedupe_task_ids(tasks: &[ExecutionTask]) -> Vec<ExecutionTask> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    tasks
        .iter()
        .map(|task| {
            let count = seen.entry(task.id.clone()).or_insert(0);
            *count += 1;
            let mut task = task.clone();
            if *count > 1 {
                task.id = format!("{}#{}", task.id, count);
            }
            task
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{ExecutionMode, TaskPhase};

    fn task(id: &str, deps: &[&str], mode: ExecutionMode, priority: i32) -> ExecutionTask {
        let mut task = ExecutionTask::new(id, TaskPhase::Pages, "frontend-pages");
        task.depends_on = deps.iter().map(|d| d.to_string()).collect();
        task.mode = mode;
        task.priority = priority;
        task
    }

    #[test]
    fn dependencies_land_in_strictly_earlier_waves() {
        let tasks = vec![
            task("a", &[], ExecutionMode::Serial, 0),
            task("b", &["a"], ExecutionMode::Serial, 0),
            task("c", &["a"], ExecutionMode::Parallel, 0),
            task("d", &["b", "c"], ExecutionMode::Serial, 0),
        ];
        let schedule = build_schedule(&tasks);
        assert!(!schedule.has_cycle);
        for t in &tasks {
            for dep in &t.depends_on {
                assert!(schedule.wave_of(dep).unwrap() < schedule.wave_of(&t.id).unwrap());
            }
        }
    }

    #[test]
    fn cycle_is_reported_with_residual() {
        let tasks = vec![
            task("a", &["c"], ExecutionMode::Serial, 0),
            task("b", &["a"], ExecutionMode::Serial, 0),
            task("c", &["b"], ExecutionMode::Serial, 0),
            task("free", &[], ExecutionMode::Serial, 0),
        ];
        let schedule = build_schedule(&tasks);
        assert!(schedule.has_cycle);
        assert_eq!(schedule.ordered_task_ids, vec!["free".to_string()]);
        assert_eq!(
            schedule.residual_task_ids,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn duplicate_ids_are_renamed_deterministically() {
        let tasks = vec![
            task("x", &[], ExecutionMode::Serial, 0),
            task("x", &[], ExecutionMode::Serial, 0),
            task("x", &[], ExecutionMode::Serial, 0),
        ];
        let schedule = build_schedule(&tasks);
        assert_eq!(
            schedule.ordered_task_ids,
            vec!["x".to_string(), "x#2".to_string(), "x#3".to_string()]
        );
    }

    #[test]
    fn unknown_self_and_duplicate_deps_are_dropped() {
        let tasks = vec![
            task("a", &[], ExecutionMode::Serial, 0),
            task("b", &["a", "ghost", "b", "a"], ExecutionMode::Serial, 0),
        ];
        let schedule = build_schedule(&tasks);
        assert!(!schedule.has_cycle);
        assert_eq!(schedule.wave_of("a"), Some(0));
        assert_eq!(schedule.wave_of("b"), Some(1));
    }

    #[test]
    fn priority_breaks_ties_within_a_wave() {
        let tasks = vec![
            task("low", &[], ExecutionMode::Parallel, 1),
            task("high", &[], ExecutionMode::Parallel, 5),
            task("mid", &[], ExecutionMode::Parallel, 3),
        ];
        let schedule = build_schedule(&tasks);
        assert_eq!(
            schedule.ordered_task_ids,
            vec!["high".to_string(), "mid".to_string(), "low".to_string()]
        );
        // same mode throughout keeps the wave as one group
        assert_eq!(schedule.groups.len(), 1);
    }

    #[test]
    fn contiguous_mode_runs_form_groups() {
        let tasks = vec![
            task("p1", &[], ExecutionMode::Parallel, 3),
            task("p2", &[], ExecutionMode::Parallel, 2),
            task("s1", &[], ExecutionMode::Serial, 1),
        ];
        let schedule = build_schedule(&tasks);
        assert_eq!(schedule.groups.len(), 2);
        assert_eq!(schedule.groups[0].mode, ExecutionMode::Parallel);
        assert_eq!(schedule.groups[0].task_ids.len(), 2);
        assert_eq!(schedule.groups[1].mode, ExecutionMode::Serial);
        assert_eq!(schedule.groups[0].wave, 0);
        assert_eq!(schedule.groups[1].wave, 0);
    }
}
