use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .env_remove("GRADEBOOKD_DEMO")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

struct School {
    teacher_id: String,
    student_id: String,
    course_x: String,
    course_y: String,
    course_z: String,
}

fn create_profile(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    role: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "profiles.create",
        json!({ "name": name, "email": format!("{}@example.com", id), "role": role }),
    );
    res["profile"]["id"].as_str().expect("profile id").to_string()
}

fn create_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    teacher_id: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "courses.create",
        json!({ "name": name, "code": id, "teacherId": teacher_id }),
    );
    res["course"]["id"].as_str().expect("course id").to_string()
}

fn setup_school(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> School {
    let teacher_id = create_profile(stdin, reader, "p1", "Teacher User", "teacher");
    let student_id = create_profile(stdin, reader, "p2", "Alex Johnson", "student");
    let course_x = create_course(stdin, reader, "x1", "Course X", &teacher_id);
    let course_y = create_course(stdin, reader, "y1", "Course Y", &teacher_id);
    let course_z = create_course(stdin, reader, "z1", "Course Z", &teacher_id);
    for (i, course_id) in [&course_x, &course_y].iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("enroll-{}", i),
            "enrollments.add",
            json!({ "courseId": course_id, "studentId": student_id }),
        );
    }
    School {
        teacher_id,
        student_id,
        course_x,
        course_y,
        course_z,
    }
}

fn add_grade(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    course_id: &str,
    value: serde_json::Value,
    date: &str,
) {
    request_ok(
        stdin,
        reader,
        id,
        "grades.add",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "value": value,
            "date": date,
        }),
    );
}

#[test]
fn overall_average_is_mean_of_course_averages() {
    let workspace = temp_dir("gradebook-report-policy");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = setup_school(&mut stdin, &mut reader);

    add_grade(&mut stdin, &mut reader, "g1", &school.student_id, &school.course_x, json!(100), "2024-03-01");
    add_grade(&mut stdin, &mut reader, "g2", &school.student_id, &school.course_y, json!(0), "2024-03-02");
    add_grade(&mut stdin, &mut reader, "g3", &school.student_id, &school.course_y, json!(0), "2024-03-03");

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "reports.student",
        json!({ "studentId": school.student_id }),
    );
    assert_eq!(report["studentName"], json!("Alex Johnson"));
    assert_eq!(report["overallAverage"].as_f64(), Some(50.0));

    let courses = report["courses"].as_array().expect("courses");
    assert_eq!(courses.len(), 2);
    let by_id = |id: &str| {
        courses
            .iter()
            .find(|c| c["courseId"].as_str() == Some(id))
            .cloned()
            .expect("course in report")
    };
    assert_eq!(by_id(school.course_x.as_str())["average"].as_f64(), Some(100.0));
    assert_eq!(by_id(school.course_y.as_str())["average"].as_f64(), Some(0.0));
    assert_eq!(by_id(school.course_y.as_str())["grades"].as_array().map(|g| g.len()), Some(2));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn enrollment_decides_which_courses_appear() {
    let workspace = temp_dir("gradebook-report-enrollment");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = setup_school(&mut stdin, &mut reader);

    // Course Z is not an enrollment; its grade must not reach the report.
    add_grade(&mut stdin, &mut reader, "g1", &school.student_id, &school.course_x, json!(80), "2024-03-01");
    add_grade(&mut stdin, &mut reader, "g2", &school.student_id, &school.course_z, json!(10), "2024-03-02");

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "reports.student",
        json!({ "studentId": school.student_id }),
    );
    let courses = report["courses"].as_array().expect("courses");
    assert_eq!(courses.len(), 2);
    assert!(courses
        .iter()
        .all(|c| c["courseId"].as_str() != Some(school.course_z.as_str())));

    let empty = courses
        .iter()
        .find(|c| c["courseId"].as_str() == Some(school.course_y.as_str()))
        .expect("course y present without grades");
    assert_eq!(empty["grades"].as_array().map(|g| g.len()), Some(0));
    assert_eq!(empty["average"].as_f64(), Some(0.0));
    assert_eq!(report["overallAverage"].as_f64(), Some(40.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_without_enrollments_gets_zero_report() {
    let workspace = temp_dir("gradebook-report-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = create_profile(&mut stdin, &mut reader, "p1", "Emily Chen", "student");

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "reports.student",
        json!({ "studentId": student_id }),
    );
    assert_eq!(report["courses"], json!([]));
    assert_eq!(report["overallAverage"].as_f64(), Some(0.0));

    let recent = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "reports.recentGrades",
        json!({ "studentId": student_id }),
    );
    assert_eq!(recent["grades"], json!([]));

    let missing = request(&mut stdin, &mut reader, "r3", "reports.student", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn recent_grades_are_oldest_first_and_truncated() {
    let workspace = temp_dir("gradebook-report-recent");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = setup_school(&mut stdin, &mut reader);

    for day in 1..=5 {
        add_grade(
            &mut stdin,
            &mut reader,
            &format!("g{}", day),
            &school.student_id,
            if day % 2 == 0 { &school.course_x } else { &school.course_y },
            json!(70 + day),
            &format!("2024-04-{:02}", 6 - day),
        );
    }

    let recent = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "reports.recentGrades",
        json!({ "studentId": school.student_id, "limit": 3 }),
    );
    let dates: Vec<&str> = recent["grades"]
        .as_array()
        .expect("grades")
        .iter()
        .filter_map(|g| g["date"].as_str())
        .collect();
    assert_eq!(dates, vec!["2024-04-03", "2024-04-04", "2024-04-05"]);

    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "reports.teacherOverview",
        json!({ "teacherId": school.teacher_id }),
    );
    assert_eq!(overview["courseCount"].as_u64(), Some(3));

    drop(stdin);
    let _ = child.wait();
}
